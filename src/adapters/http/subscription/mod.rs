//! HTTP adapter for plan and subscription endpoints.
//!
//! Exposes the ledger via REST API:
//! - `GET /api/plans` - List plans open for assignment
//! - `GET /api/plans/:plan_id` - Get a plan
//! - `PUT /api/plans/:plan_id/activation` - Open or close a plan
//! - `POST /api/users/:user_id/plan` - Assign a plan
//! - `GET /api/users/:user_id/plan` - Get the active subscription
//! - `DELETE /api/users/:user_id/plan` - Cancel the active subscription
//! - `PUT /api/users/:user_id/plan/renewal` - Move the expiry
//! - `GET /api/users/:user_id/plan/history` - Plan history
//! - `GET /api/users/:user_id/subscriptions` - Every subscription period
//! - `GET /api/subscriptions/expiring` - Active subscriptions ending soon
//! - `POST /api/admin/sweeps` - Run one expiration sweep

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{SubscriptionApiError, SubscriptionAppState};
pub use routes::subscription_routes;
