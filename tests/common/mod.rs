//! Shared wiring for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use plan_ledger::adapters::{FixedClock, InMemorySubscriptionStore};
use plan_ledger::application::{
    ExpirationSweeper, LedgerConfig, PlanCatalog, SubscriptionLedger, SweeperConfig,
};
use plan_ledger::domain::foundation::{PlanId, Timestamp, UserId};
use plan_ledger::domain::subscription::{Plan, SubscriptionStatus};

pub fn at(month: u32, day: u32, hour: u32) -> Timestamp {
    Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, month, day, hour, 0, 0).unwrap())
}

pub fn user(name: &str) -> UserId {
    UserId::new(name).unwrap()
}

pub struct World {
    pub store: InMemorySubscriptionStore,
    pub clock: Arc<FixedClock>,
    pub ledger: Arc<SubscriptionLedger>,
    pub sweeper: Arc<ExpirationSweeper>,
    pub monthly: Plan,
    pub yearly: Plan,
}

impl World {
    pub fn new() -> Self {
        Self::with_sweeper_config(SweeperConfig::default())
    }

    pub fn with_sweeper_config(sweeper_config: SweeperConfig) -> Self {
        let monthly = Plan::new(PlanId::new(), "Monthly", 30).unwrap();
        let yearly = Plan::new(PlanId::new(), "Yearly", 365).unwrap();
        let store = InMemorySubscriptionStore::new()
            .with_plan(monthly.clone())
            .with_plan(yearly.clone());
        let clock = Arc::new(FixedClock::new(at(1, 1, 9)));

        let ledger = SubscriptionLedger::with_config(
            PlanCatalog::new(Arc::new(store.clone())),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            clock.clone(),
            LedgerConfig::default()
                .with_max_retries(8)
                .with_retry_backoff(Duration::from_millis(1)),
        );
        let sweeper = ExpirationSweeper::with_config(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            clock.clone(),
            sweeper_config,
        );

        Self {
            store,
            clock,
            ledger: Arc::new(ledger),
            sweeper: Arc::new(sweeper),
            monthly,
            yearly,
        }
    }

    /// Number of active rows the store holds for `user_id`.
    pub fn active_count(&self, user_id: &UserId) -> usize {
        self.store
            .all_subscriptions()
            .iter()
            .filter(|s| &s.user_id == user_id && s.status == SubscriptionStatus::Active)
            .count()
    }
}
