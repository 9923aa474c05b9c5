//! API Routes
//!
//! Configures the Axum router with all introspection endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, invalidate_handler, recovery_handler, reset_circuit_handler, stats_handler,
    AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check
/// - `GET /stats` - Cache statistics
/// - `GET /recovery` - Retry metrics and circuit breaker states
/// - `POST /invalidate` - Remove entries by key, tag or pattern
/// - `POST /circuits/:operation_id/reset` - Close one circuit breaker
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/recovery", get(recovery_handler))
        .route("/invalidate", post(invalidate_handler))
        .route("/circuits/:operation_id/reset", post(reset_circuit_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
