//! In-memory storage adapter.
//!
//! Implements every storage port against process memory. Used by the test
//! suites and by `serve --in-memory` for local experiments.

mod store;
mod transaction;

pub use store::InMemorySubscriptionStore;
