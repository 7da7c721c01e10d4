use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use intelwatch_storage::CollectionStateRow;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::{storage_error_response, success_response, ApiError};
use crate::logging::TraceId;
use crate::state::AppState;

/// Outcome of a manual trigger. A trigger while the job is already running is
/// not an error: `started` is simply false.
#[derive(Serialize, ToSchema)]
struct TriggerResponse {
    /// True when a new background cycle was started by this call.
    started: bool,
    /// True while a cycle of this job type is in flight.
    running: bool,
}

/// Manually start a collection cycle (synthetic timer fire, same
/// single-flight rule as the scheduler).
#[utoipa::path(
    post,
    path = "/v1/ingestion/collect",
    tag = "Ingestion",
    security(("bearer_auth" = [])),
    responses(
        (status = 202, description = "Trigger outcome", body = TriggerResponse),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
async fn trigger_collection(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let started = state.scheduler.trigger_collection_now();
    success_response(
        StatusCode::ACCEPTED,
        &trace_id,
        TriggerResponse {
            started,
            running: state.scheduler.is_collection_running(),
        },
    )
}

/// Manually start a retention sweep.
#[utoipa::path(
    post,
    path = "/v1/ingestion/sweep",
    tag = "Ingestion",
    security(("bearer_auth" = [])),
    responses(
        (status = 202, description = "Trigger outcome", body = TriggerResponse),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
async fn trigger_sweep(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let started = state.scheduler.trigger_sweep_now();
    success_response(
        StatusCode::ACCEPTED,
        &trace_id,
        TriggerResponse {
            started,
            running: state.scheduler.is_sweep_running(),
        },
    )
}

/// Ingestion status: job states plus per-source collection bookkeeping.
#[derive(Serialize, ToSchema)]
struct IngestionStatusResponse {
    collection_running: bool,
    sweep_running: bool,
    sources: Vec<CollectionStateRow>,
}

/// Ingestion observability.
#[utoipa::path(
    get,
    path = "/v1/ingestion/status",
    tag = "Ingestion",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Ingestion status", body = IngestionStatusResponse),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
async fn ingestion_status(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.store.list_collection_state().await {
        Ok(sources) => success_response(
            StatusCode::OK,
            &trace_id,
            IngestionStatusResponse {
                collection_running: state.scheduler.is_collection_running(),
                sweep_running: state.scheduler.is_sweep_running(),
                sources,
            },
        ),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

pub fn ingestion_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(trigger_collection))
        .routes(routes!(trigger_sweep))
        .routes(routes!(ingestion_status))
}
