//! API module
//!
//! HTTP surface: transfer routes, account provisioning routes and the
//! request middleware stack.

pub mod middleware;
pub mod routes;
pub mod state;

use axum::{middleware as axum_middleware, routing::get, Router};

pub use routes::create_router;
pub use state::AppState;

/// Build the full application router with middleware and health check
pub fn build_router(state: AppState) -> Router {
    create_router()
        .route("/health", get(health_check))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::context_middleware))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
