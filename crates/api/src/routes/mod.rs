//! API routes

pub mod billing;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness));

    let mut api_routes = Router::new()
        .route("/create-checkout", post(billing::create_checkout))
        .route("/verify-subscription", get(billing::verify_subscription))
        // Stripe webhook (public, relies on signature verification)
        .route("/webhook", post(billing::webhook));

    // Manual activation bypasses billing verification entirely; only wired
    // up when the deployment opts in.
    if state.config.enable_test_endpoints {
        api_routes = api_routes.route("/test-subscription", post(billing::test_subscription));
    }

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .with_state(state)
}
