//! Subscription domain - plan assignment periods and their audit trail.
//!
//! # Module Structure
//!
//! - `plan` - Plan template (duration, activation flag)
//! - `status` - Subscription status state machine
//! - `aggregate` - Subscription aggregate
//! - `history` - Append-only transition records
//! - `errors` - Subscription-specific errors

mod aggregate;
mod errors;
mod history;
mod plan;
mod status;

pub use aggregate::Subscription;
pub use errors::SubscriptionError;
pub use history::{HistoryAction, HistoryEntry, HistoryMetadata};
pub use plan::Plan;
pub use status::SubscriptionStatus;
