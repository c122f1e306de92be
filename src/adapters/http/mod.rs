//! HTTP adapters - REST API implementations.

pub mod subscription;

use std::time::Duration;

use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use subscription::{subscription_routes, SubscriptionApiError, SubscriptionAppState};

/// Builds the full API router with request tracing and a per-request timeout.
pub fn router(state: SubscriptionAppState, request_timeout: Duration) -> Router {
    Router::new()
        .nest("/api", subscription_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
