//! HTTP surface: the JSON API router and its shared middleware.

pub mod error;
mod handlers;
mod middleware;
mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};

use middleware::log_responses;

/// Build the API router. Static routes win over the `{endpoint}` capture, so
/// `/api/batch` and friends are never mistaken for report names.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api", get(handlers::index))
        .route("/api/health", get(handlers::health))
        .route("/api/health/check", get(handlers::health_check))
        .route("/api/batch", post(handlers::batch))
        .route("/api/preload", get(handlers::preload))
        .route("/api/cache/stats", get(handlers::cache_stats))
        .route("/api/cache/info", get(handlers::cache_info))
        .route("/api/cache", delete(handlers::cache_clear))
        .route(
            "/api/alert-recipients",
            get(handlers::list_recipients).post(handlers::create_recipient),
        )
        .route(
            "/api/alert-recipients/{id}",
            put(handlers::update_recipient).delete(handlers::delete_recipient),
        )
        .route("/api/alerts/dispatch", post(handlers::dispatch_alerts))
        .route("/api/{endpoint}", get(handlers::report))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
}
