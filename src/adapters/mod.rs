//! Adapters - Implementations of port interfaces.
//!
//! - `clock` - System and fixed clocks
//! - `memory` - In-memory store with staged transactions
//! - `postgres` - PostgreSQL repositories over `sqlx`
//! - `http` - REST API over `axum`

pub mod clock;
pub mod http;
pub mod memory;
pub mod postgres;

pub use clock::{FixedClock, SystemClock};
pub use memory::InMemorySubscriptionStore;
pub use postgres::{PostgresPlanRepository, PostgresSubscriptionReader, PostgresSubscriptionStore};
