//! API Routes
//!
//! Configures the Axum router with all tag cache endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_entry_handler, derive_key_handler, get_entry_handler, health_handler,
    invalidate_keys_handler, invalidate_tags_handler, presets_handler, set_entry_handler,
    stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/entries", put(set_entry_handler))
        .route(
            "/entries/:key",
            get(get_entry_handler).delete(delete_entry_handler),
        )
        .route("/invalidate/keys", post(invalidate_keys_handler))
        .route("/invalidate/tags", post(invalidate_tags_handler))
        .route("/keys", post(derive_key_handler))
        .route("/presets", get(presets_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
