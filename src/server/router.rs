use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers;
use crate::state::AppState;

/// Main application router: the webhook that transports post inbound
/// messages to, plus the operational endpoints for the knowledge base
/// and conversation sessions.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/webhook/message", post(handlers::webhook))
        .route(
            "/api/knowledge-base/count",
            get(handlers::knowledge_base_count),
        )
        .route(
            "/api/knowledge-base/clear",
            post(handlers::knowledge_base_clear),
        )
        .route(
            "/api/conversation/:conversant_id",
            get(handlers::get_conversation),
        )
        .route(
            "/api/conversation/:conversant_id/clear",
            post(handlers::clear_conversation),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}
