//! Router assembly.
//!
//! `main` wraps [`lead_routes`] in rate limiting before handing it to
//! [`build_app`]; tests use the routes unwrapped.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{self, AppState};
use crate::models::{BatchIntakeResponse, BatchItemResult, ReconcileOutcome, StoredLead};

/// Request size limit: 5MB max payload
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::submit_lead,
        handlers::submit_batch,
        handlers::lookup_lead
    ),
    components(schemas(ReconcileOutcome, StoredLead, BatchIntakeResponse, BatchItemResult)),
    tags((name = "leads", description = "Lead intake reconciliation"))
)]
pub struct ApiDoc;

/// Lead intake endpoints, without state.
pub fn lead_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/leads", post(handlers::submit_lead))
        .route("/api/v1/leads/batch", post(handlers::submit_batch))
        .route("/api/v1/leads/lookup", get(handlers::lookup_lead))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}

/// Adds health check, API docs and HTTP middleware around the lead routes.
pub fn build_app(lead_routes: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(lead_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
