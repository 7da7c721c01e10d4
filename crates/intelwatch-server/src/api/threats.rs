use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use intelwatch_common::types::{
    BulkDeleteRequest, BulkThreatsRequest, CreateThreatRequest, ThreatRecord, ThreatUpdate,
    UpdateThreatRequest,
};
use intelwatch_feeds::normalizer::normalize;
use intelwatch_feeds::RawFeedItem;
use intelwatch_storage::{ThreatListFilter, ThreatStore};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::pagination::PaginationParams;
use crate::api::{
    error_response, normalization_error_response, storage_error_response, success_paginated_response,
    success_response, ApiError,
};
use crate::logging::TraceId;
use crate::state::AppState;

/// Threat listing filters.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ThreatListParams {
    /// Filter by indicator type (ip / domain / url / hash / email).
    #[serde(default, rename = "type")]
    #[param(required = false)]
    pub indicator_type: Option<String>,
    /// Filter by category.
    #[serde(default)]
    #[param(required = false)]
    pub category: Option<String>,
    /// Filter by severity.
    #[serde(default)]
    #[param(required = false)]
    pub severity: Option<String>,
    /// Source substring match.
    #[serde(default)]
    #[param(required = false)]
    pub source: Option<String>,
    /// Filter by active flag.
    #[serde(default)]
    #[param(required = false)]
    pub active: Option<bool>,
    /// `first_seen` lower bound (RFC 3339).
    #[serde(default)]
    #[param(required = false)]
    pub start_date: Option<DateTime<Utc>>,
    /// `first_seen` upper bound (RFC 3339).
    #[serde(default)]
    #[param(required = false)]
    pub end_date: Option<DateTime<Utc>>,
}

fn build_filter(
    trace_id: &str,
    params: &ThreatListParams,
) -> Result<ThreatListFilter, axum::response::Response> {
    let mut filter = ThreatListFilter {
        source_contains: params.source.clone(),
        is_active_eq: params.active,
        first_seen_gte: params.start_date,
        first_seen_lte: params.end_date,
        ..Default::default()
    };
    if let Some(ref s) = params.indicator_type {
        filter.indicator_type_eq = Some(s.parse().map_err(|_| {
            error_response(
                StatusCode::BAD_REQUEST,
                trace_id,
                "bad_request",
                &format!("unknown indicator type: {s}"),
            )
        })?);
    }
    if let Some(ref s) = params.category {
        filter.category_eq = Some(s.parse().map_err(|_| {
            error_response(
                StatusCode::BAD_REQUEST,
                trace_id,
                "bad_request",
                &format!("unknown category: {s}"),
            )
        })?);
    }
    if let Some(ref s) = params.severity {
        filter.severity_eq = Some(s.parse().map_err(|_| {
            error_response(
                StatusCode::BAD_REQUEST,
                trace_id,
                "bad_request",
                &format!("unknown severity: {s}"),
            )
        })?);
    }
    Ok(filter)
}

/// Paginated threat listing, most recently seen first.
#[utoipa::path(
    get,
    path = "/v1/threats",
    tag = "Threats",
    security(("bearer_auth" = [])),
    params(ThreatListParams, PaginationParams),
    responses(
        (status = 200, description = "Paginated threats", body = Vec<ThreatRecord>),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
async fn list_threats(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ThreatListParams>,
    Query(page): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = match build_filter(&trace_id, &params) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let total = match state.store.count_threats(&filter).await {
        Ok(n) => n,
        Err(e) => return storage_error_response(&trace_id, &e),
    };
    match state
        .store
        .list_threats(&filter, page.limit(), page.offset())
        .await
    {
        Ok(items) => success_paginated_response(
            StatusCode::OK,
            &trace_id,
            items,
            total,
            page.limit(),
            page.offset(),
        ),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// Search parameters.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ThreatSearchParams {
    /// Search term matched against value, description, and tags.
    pub q: String,
    /// Restrict to one indicator type.
    #[serde(default, rename = "type")]
    #[param(required = false)]
    pub indicator_type: Option<String>,
}

const SEARCH_RESULT_LIMIT: usize = 50;

/// Free-text threat search.
#[utoipa::path(
    get,
    path = "/v1/threats/search",
    tag = "Threats",
    security(("bearer_auth" = [])),
    params(ThreatSearchParams),
    responses(
        (status = 200, description = "Matching threats", body = Vec<ThreatRecord>),
        (status = 400, description = "Missing search term", body = ApiError),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
async fn search_threats(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ThreatSearchParams>,
) -> impl IntoResponse {
    let q = params.q.trim();
    if q.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "search query is required",
        );
    }
    let indicator_type = match params.indicator_type.as_deref() {
        None => None,
        Some(s) => match s.parse() {
            Ok(t) => Some(t),
            Err(_) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &trace_id,
                    "bad_request",
                    &format!("unknown indicator type: {s}"),
                )
            }
        },
    };
    match state
        .store
        .search_threats(q, indicator_type, SEARCH_RESULT_LIMIT)
        .await
    {
        Ok(items) => success_response(StatusCode::OK, &trace_id, items),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// Headline threat counters.
#[utoipa::path(
    get,
    path = "/v1/threats/stats",
    tag = "Threats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Threat statistics", body = intelwatch_storage::ThreatStatsSummary),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
async fn threat_stats(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.store.threat_stats().await {
        Ok(stats) => success_response(StatusCode::OK, &trace_id, stats),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// Single threat by ID.
#[utoipa::path(
    get,
    path = "/v1/threats/{id}",
    tag = "Threats",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Threat ID")),
    responses(
        (status = 200, description = "Threat record", body = ThreatRecord),
        (status = 404, description = "Threat not found", body = ApiError)
    )
)]
async fn get_threat(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_threat_by_id(&id).await {
        Ok(Some(threat)) => success_response(StatusCode::OK, &trace_id, threat),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "threat not found",
        ),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

fn request_to_raw_item(req: &CreateThreatRequest) -> RawFeedItem {
    RawFeedItem {
        indicator_type: Some(req.indicator_type.clone()),
        value: Some(req.value.clone()),
        category: Some(req.category.clone()),
        severity: Some(req.severity.clone()),
        confidence: Some(f64::from(req.confidence)),
        description: req.description.clone(),
        geolocation: req.geolocation.clone(),
        tags: req.tags.clone(),
        metadata: req.metadata.clone(),
    }
}

/// Response for create-or-observe.
#[derive(Serialize, ToSchema)]
struct ThreatUpsertResponse {
    threat: ThreatRecord,
    /// True when a new record was created, false when an existing active
    /// record was updated.
    created: bool,
}

/// Submit one threat observation. Validated like a feed item and routed
/// through the deduplicating upsert: an existing active record for the same
/// (value, type, source) is updated instead of duplicated.
#[utoipa::path(
    post,
    path = "/v1/threats",
    tag = "Threats",
    security(("bearer_auth" = [])),
    request_body = CreateThreatRequest,
    responses(
        (status = 201, description = "Threat created", body = ThreatRecord),
        (status = 200, description = "Existing threat updated", body = ThreatRecord),
        (status = 400, description = "Validation failed", body = ApiError)
    )
)]
async fn create_threat(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<CreateThreatRequest>,
) -> impl IntoResponse {
    let raw = request_to_raw_item(&req);
    let observation = match normalize(&raw, &req.source) {
        Ok(obs) => obs,
        Err(e) => return normalization_error_response(&trace_id, &e),
    };
    match state.engine.upsert(&observation).await {
        Ok(outcome) => {
            let created = outcome.is_created();
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            success_response(
                status,
                &trace_id,
                ThreatUpsertResponse {
                    threat: outcome.record().clone(),
                    created,
                },
            )
        }
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// Patch a stored threat. Provided fields replace stored values; omitted
/// fields keep them. The dedup key, `first_seen`, and `observation_count`
/// are never changed here.
#[utoipa::path(
    put,
    path = "/v1/threats/{id}",
    tag = "Threats",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Threat ID")),
    request_body = UpdateThreatRequest,
    responses(
        (status = 200, description = "Threat updated", body = ThreatRecord),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Threat not found", body = ApiError)
    )
)]
async fn update_threat(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateThreatRequest>,
) -> impl IntoResponse {
    let existing = match state.store.get_threat_by_id(&id).await {
        Ok(Some(threat)) => threat,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "threat not found",
            )
        }
        Err(e) => return storage_error_response(&trace_id, &e),
    };

    let category = match req.category.as_deref() {
        None => existing.category,
        Some(s) => match s.parse() {
            Ok(c) => c,
            Err(_) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &trace_id,
                    "bad_request",
                    &format!("unknown category: {s}"),
                )
            }
        },
    };
    let severity = match req.severity.as_deref() {
        None => existing.severity,
        Some(s) => match s.parse() {
            Ok(sev) => sev,
            Err(_) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &trace_id,
                    "bad_request",
                    &format!("unknown severity: {s}"),
                )
            }
        },
    };
    if let Some(confidence) = req.confidence {
        if !(0..=100).contains(&confidence) {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "out_of_range",
                &format!("confidence out of range: {confidence}"),
            );
        }
    }

    let update = ThreatUpdate {
        category,
        severity,
        confidence: req.confidence.unwrap_or(existing.confidence),
        description: req.description.clone().or(existing.description),
        geolocation: req.geolocation.clone().or(existing.geolocation),
        tags: req.tags.clone().unwrap_or(existing.tags),
        metadata: req.metadata.clone().unwrap_or(existing.metadata),
        last_seen: Utc::now(),
        observation_count: existing.observation_count,
    };
    match state.store.update_threat(&id, &update).await {
        Ok(threat) => success_response(StatusCode::OK, &trace_id, threat),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// Delete a threat. Administrative operation; ingestion itself never deletes.
#[utoipa::path(
    delete,
    path = "/v1/threats/{id}",
    tag = "Threats",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Threat ID")),
    responses(
        (status = 200, description = "Threat deleted"),
        (status = 404, description = "Threat not found", body = ApiError)
    )
)]
async fn delete_threat(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_threat(&id).await {
        Ok(true) => {
            crate::api::success_empty_response(StatusCode::OK, &trace_id, "threat deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "threat not found",
        ),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// Bulk upsert outcome. Items are independent: failures are counted, never
/// propagated.
#[derive(Serialize, ToSchema)]
struct BulkThreatsResponse {
    total: usize,
    created: usize,
    updated: usize,
    failed: usize,
}

/// Submit a batch of observations with per-item outcomes.
#[utoipa::path(
    post,
    path = "/v1/threats/bulk",
    tag = "Threats",
    security(("bearer_auth" = [])),
    request_body = BulkThreatsRequest,
    responses(
        (status = 200, description = "Batch processed", body = BulkThreatsResponse),
        (status = 400, description = "Empty batch", body = ApiError)
    )
)]
async fn bulk_create_threats(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<BulkThreatsRequest>,
) -> impl IntoResponse {
    if req.threats.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "empty_batch",
            "threats array is required",
        );
    }

    let mut observations = Vec::with_capacity(req.threats.len());
    let mut rejected = 0usize;
    for item in &req.threats {
        match normalize(&request_to_raw_item(item), &item.source) {
            Ok(obs) => observations.push(obs),
            Err(e) => {
                rejected += 1;
                tracing::warn!(value = ?item.value, error = %e, "Rejected bulk threat item");
            }
        }
    }

    let report = state.engine.upsert_batch(&observations).await;
    tracing::info!(
        total = req.threats.len(),
        created = report.created,
        updated = report.updated,
        failed = report.failed + rejected,
        "Bulk threat operation completed"
    );
    success_response(
        StatusCode::OK,
        &trace_id,
        BulkThreatsResponse {
            total: req.threats.len(),
            created: report.created,
            updated: report.updated,
            failed: report.failed + rejected,
        },
    )
}

/// Bulk delete outcome.
#[derive(Serialize, ToSchema)]
struct BulkDeleteResponse {
    deleted: u64,
}

/// Delete a set of threats by ID.
#[utoipa::path(
    delete,
    path = "/v1/threats/bulk",
    tag = "Threats",
    security(("bearer_auth" = [])),
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Threats deleted", body = BulkDeleteResponse),
        (status = 400, description = "Empty id list", body = ApiError)
    )
)]
async fn bulk_delete_threats(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<BulkDeleteRequest>,
) -> impl IntoResponse {
    if req.ids.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "empty_batch",
            "ids array is required",
        );
    }
    match state.store.bulk_delete_threats(&req.ids).await {
        Ok(deleted) => success_response(StatusCode::OK, &trace_id, BulkDeleteResponse { deleted }),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

pub fn threat_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_threats, create_threat))
        .routes(routes!(search_threats))
        .routes(routes!(threat_stats))
        .routes(routes!(bulk_create_threats, bulk_delete_threats))
        .routes(routes!(get_threat, update_threat, delete_threat))
}
