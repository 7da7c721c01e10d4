use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use intelwatch_common::types::ThreatRecord;
use intelwatch_storage::{DashboardSummary, GeoPoint, ThreatListFilter, TimeseriesPoint};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::{storage_error_response, success_response, ApiError};
use crate::logging::TraceId;
use crate::state::AppState;

const RECENT_ACTIVITY_LIMIT: usize = 10;

/// Dashboard payload: overview counters, distributions, and recent activity.
#[derive(Serialize, ToSchema)]
struct DashboardResponse {
    #[serde(flatten)]
    summary: DashboardSummary,
    recent_activity: Vec<ThreatRecord>,
}

/// Dashboard analytics.
#[utoipa::path(
    get,
    path = "/v1/analytics/dashboard",
    tag = "Analytics",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard analytics", body = DashboardResponse),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
async fn dashboard(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let summary = match state.store.dashboard_summary().await {
        Ok(s) => s,
        Err(e) => return storage_error_response(&trace_id, &e),
    };
    let recent_activity = match state
        .store
        .list_threats(&ThreatListFilter::default(), RECENT_ACTIVITY_LIMIT, 0)
        .await
    {
        Ok(rows) => rows,
        Err(e) => return storage_error_response(&trace_id, &e),
    };
    success_response(
        StatusCode::OK,
        &trace_id,
        DashboardResponse {
            summary,
            recent_activity,
        },
    )
}

/// Timeseries query window.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TimeseriesParams {
    /// Number of days to look back (default 30, max 365).
    #[serde(default)]
    #[param(required = false)]
    pub days: Option<u32>,
}

const MAX_TIMESERIES_DAYS: u32 = 365;

/// Per-day new-threat counts.
#[utoipa::path(
    get,
    path = "/v1/analytics/timeseries",
    tag = "Analytics",
    security(("bearer_auth" = [])),
    params(TimeseriesParams),
    responses(
        (status = 200, description = "Daily threat counts", body = Vec<TimeseriesPoint>),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
async fn timeseries(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<TimeseriesParams>,
) -> impl IntoResponse {
    let days = params.days.unwrap_or(30).clamp(1, MAX_TIMESERIES_DAYS);
    match state.store.threat_timeseries(days).await {
        Ok(points) => success_response(StatusCode::OK, &trace_id, points),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// Geolocated threat aggregation for the map view.
#[utoipa::path(
    get,
    path = "/v1/analytics/geographic",
    tag = "Analytics",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Geographic distribution", body = Vec<GeoPoint>),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
async fn geographic(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.store.geographic_distribution().await {
        Ok(points) => success_response(StatusCode::OK, &trace_id, points),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

pub fn analytics_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(dashboard))
        .routes(routes!(timeseries))
        .routes(routes!(geographic))
}
