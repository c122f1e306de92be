//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `PlanRepository` - Plan lookup and activation toggle
//! - `UnitOfWork` / `Transaction` - Scoped transactions over subscriptions and history
//! - `SubscriptionRepository` / `HistoryRepository` - Transaction-bound writes
//! - `SubscriptionReader` - Non-locking queries
//!
//! ## Runtime Ports
//!
//! - `Clock` - Source of the current instant

mod clock;
mod plan_repository;
mod subscription_reader;
mod subscription_store;

pub use clock::Clock;
pub use plan_repository::PlanRepository;
pub use subscription_reader::{ExpiryCursor, SubscriptionReader};
pub use subscription_store::{HistoryRepository, SubscriptionRepository, Transaction, UnitOfWork};
