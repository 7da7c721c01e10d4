pub mod analytics;
pub mod ingestion;
pub mod pagination;
pub mod threats;

use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use intelwatch_feeds::error::NormalizationError;
use intelwatch_storage::StorageError;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// API error response.
#[derive(Serialize, ToSchema)]
pub struct ApiError {
    /// Numeric error code.
    pub err_code: i32,
    /// Error message.
    pub err_msg: String,
    /// Request trace ID.
    pub trace_id: String,
}

/// Unified API response envelope.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// Error code (0 on success).
    pub err_code: i32,
    /// Error message ("success" on success).
    pub err_msg: String,
    /// Request trace ID.
    pub trace_id: String,
    /// Payload, when there is one.
    pub data: Option<T>,
}

/// Paginated payload wrapper.
#[derive(Serialize, ToSchema)]
pub struct PaginatedData<T>
where
    T: Serialize,
{
    pub items: Vec<T>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

pub fn success_empty_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: 0,
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

pub fn success_paginated_response<T>(
    status: StatusCode,
    trace_id: &str,
    items: Vec<T>,
    total: u64,
    limit: usize,
    offset: usize,
) -> Response
where
    T: Serialize,
{
    success_response(
        status,
        trace_id,
        PaginatedData {
            items,
            total,
            limit,
            offset,
        },
    )
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "unauthorized" => 1002,
        "token_expired" => 1003,
        "not_found" => 1004,
        "conflict" => 1005,
        "invalid_indicator" => 1101,
        "out_of_range" => 1102,
        "missing_field" => 1103,
        "empty_batch" => 1104,
        "storage_error" => 1501,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

/// Map a storage failure onto the envelope. Not-found and conflict surface as
/// client errors; everything else is a 500.
pub fn storage_error_response(trace_id: &str, err: &StorageError) -> Response {
    match err {
        StorageError::NotFound { .. } => error_response(
            StatusCode::NOT_FOUND,
            trace_id,
            "not_found",
            &err.to_string(),
        ),
        StorageError::Conflict { .. } => error_response(
            StatusCode::CONFLICT,
            trace_id,
            "conflict",
            &err.to_string(),
        ),
        _ => {
            tracing::error!(error = %err, "Storage operation failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "storage_error",
                "storage error",
            )
        }
    }
}

/// Map a normalization failure onto the envelope with field-level detail so a
/// client can correct its input.
pub fn normalization_error_response(trace_id: &str, err: &NormalizationError) -> Response {
    let code = match err {
        NormalizationError::InvalidIndicator { .. } => "invalid_indicator",
        NormalizationError::OutOfRange { .. } => "out_of_range",
        NormalizationError::MissingField { .. } => "missing_field",
    };
    error_response(StatusCode::BAD_REQUEST, trace_id, code, &err.to_string())
}

/// Health check response.
#[derive(Serialize, ToSchema)]
struct HealthResponse {
    /// Service version.
    version: String,
    /// Uptime in seconds.
    uptime_secs: i64,
    /// Whether a collection cycle is currently running.
    collection_running: bool,
}

/// Service health. No authentication required.
#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let uptime = (Utc::now() - state.start_time).num_seconds();
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime,
            collection_running: state.scheduler.is_collection_running(),
        },
    )
}

pub fn public_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(health))
}

pub fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(crate::auth::login))
        .routes(routes!(crate::auth::register))
}

pub fn protected_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(crate::auth::me))
        .merge(threats::threat_routes())
        .merge(analytics::analytics_routes())
        .merge(ingestion::ingestion_routes())
}
