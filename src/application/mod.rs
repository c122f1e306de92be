//! Application layer - services that orchestrate domain operations over ports.
//!
//! - `PlanCatalog` - plan lookup and activation toggle
//! - `HistoryRecorder` - audit appends inside an open transaction
//! - `SubscriptionLedger` - assign, renew, cancel and queries
//! - `ExpirationSweeper` - batch expiry and the scheduler loop

mod history_recorder;
mod ledger;
mod plan_catalog;
mod sweeper;

pub use history_recorder::HistoryRecorder;
pub use ledger::{LedgerConfig, SubscriptionLedger};
pub use plan_catalog::PlanCatalog;
pub use sweeper::{ExpirationSweeper, SweepReport, SweeperConfig};
