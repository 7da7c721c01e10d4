use crate::state::AppState;
use crate::{api, auth, logging};
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "intelwatch API",
        description = "Threat intelligence REST API",
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Auth", description = "Authentication"),
        (name = "Threats", description = "Threat records"),
        (name = "Analytics", description = "Dashboard aggregation"),
        (name = "Ingestion", description = "Feed collection and retention")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(utoipa::openapi::security::Http::new(
                utoipa::openapi::security::HttpAuthScheme::Bearer,
            )),
        );
    }
}

pub fn build_http_app(state: AppState) -> Router {
    let (public_router, public_spec) = api::public_routes().split_for_parts();
    let (auth_router, auth_spec) = api::auth_routes().split_for_parts();
    let (protected_router, protected_spec) = api::protected_routes().split_for_parts();

    let mut merged_spec = ApiDoc::openapi();
    merged_spec.merge(public_spec);
    merged_spec.merge(auth_spec);
    merged_spec.merge(protected_spec);
    let spec = Arc::new(merged_spec);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public_router
        .merge(auth_router)
        .merge(protected_router.layer(middleware::from_fn_with_state(
            state.clone(),
            auth::jwt_auth_middleware,
        )))
        .with_state(state)
        .route(
            "/v1/openapi.json",
            get(move || {
                let spec = Arc::clone(&spec);
                async move { Json(spec.as_ref().clone()) }
            }),
        )
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
