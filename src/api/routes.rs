//! API Routes
//!
//! Configures the Axum router with all gateway endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    add_handler, clear_handler, decr_handler, delete_handler, delete_many_handler,
    get_handler, get_many_handler, health_handler, incr_handler, set_handler, set_many_handler,
    stats_handler, touch_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET|PUT|DELETE /cache/:key` - get, set, delete
/// - `POST /cache/:key/{add,incr,decr,touch}`
/// - `POST /many/{get,set,delete}` - bulk operations
/// - `DELETE /cache` - flush everything
/// - `GET /stats` - adapter statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/cache", delete(clear_handler))
        .route(
            "/cache/:key",
            get(get_handler).put(set_handler).delete(delete_handler),
        )
        .route("/cache/:key/add", post(add_handler))
        .route("/cache/:key/incr", post(incr_handler))
        .route("/cache/:key/decr", post(decr_handler))
        .route("/cache/:key/touch", post(touch_handler))
        .route("/many/get", post(get_many_handler))
        .route("/many/set", post(set_many_handler))
        .route("/many/delete", post(delete_many_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
