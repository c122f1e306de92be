//! Plan Ledger - subscription plan lifecycle with an append-only history
//!
//! Users hold at most one active plan at a time. Every assignment, renewal,
//! cancellation and expiry is written together with its history entry in a
//! single transaction, and a batch sweeper closes subscriptions whose expiry
//! instant has passed.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
