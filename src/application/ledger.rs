//! SubscriptionLedger - owner of the one-active-subscription-per-user rule.
//!
//! Every mutating operation opens one transaction, locks the user's active
//! row, applies the domain transition, records history through the
//! [`HistoryRecorder`] and commits. Any error drops the transaction, which
//! rolls back both the subscription write and the history write.
//!
//! ## Retries and deadlines
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `operation_timeout` | 5s | Upper bound for one operation, retries included |
//! | `max_retries` | 3 | Extra attempts after a `ConcurrentModification` |
//! | `retry_backoff` | 25ms | Linear backoff step between attempts |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::{PlanId, SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{HistoryEntry, Plan, Subscription, SubscriptionError};
use crate::ports::{Clock, SubscriptionReader, UnitOfWork};

use super::{HistoryRecorder, PlanCatalog};

/// Retry and deadline settings for ledger operations.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub operation_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_millis(5000),
            max_retries: 3,
            retry_backoff: Duration::from_millis(25),
        }
    }
}

impl LedgerConfig {
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Assign, renew, cancel and query a user's subscription.
pub struct SubscriptionLedger {
    catalog: PlanCatalog,
    store: Arc<dyn UnitOfWork>,
    reader: Arc<dyn SubscriptionReader>,
    recorder: HistoryRecorder,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl SubscriptionLedger {
    pub fn new(
        catalog: PlanCatalog,
        store: Arc<dyn UnitOfWork>,
        reader: Arc<dyn SubscriptionReader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_config(catalog, store, reader, clock, LedgerConfig::default())
    }

    pub fn with_config(
        catalog: PlanCatalog,
        store: Arc<dyn UnitOfWork>,
        reader: Arc<dyn SubscriptionReader>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            reader,
            recorder: HistoryRecorder::new(),
            clock,
            config,
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Commands
    // ════════════════════════════════════════════════════════════════════════════

    /// Starts a new subscription to `plan_id`, closing any active one first.
    ///
    /// # Errors
    ///
    /// - `PlanNotFound` if the plan is unknown or inactive
    /// - `ConcurrentModification` if retries are exhausted
    /// - `PersistenceFailure` on storage failure or timeout
    pub async fn assign(
        &self,
        user_id: &UserId,
        plan_id: &PlanId,
    ) -> Result<Subscription, SubscriptionError> {
        self.bounded("assign", async {
            let plan = self.catalog.get_assignable(plan_id).await?;
            let plan = &plan;
            self.retrying("assign", move || self.try_assign(user_id, plan))
                .await
        })
        .await
    }

    /// Moves the expiry of the active subscription to the start of
    /// `new_expiry`'s UTC day. Earlier dates are accepted.
    ///
    /// # Errors
    ///
    /// - `NoActiveSubscription` if the user holds none
    /// - `ConcurrentModification` if retries are exhausted
    /// - `PersistenceFailure` on storage failure or timeout
    pub async fn renew(
        &self,
        user_id: &UserId,
        new_expiry: Timestamp,
    ) -> Result<Subscription, SubscriptionError> {
        self.bounded(
            "renew",
            self.retrying("renew", move || self.try_renew(user_id, new_expiry)),
        )
        .await
    }

    /// Closes the active subscription now. Returns the closed subscription.
    ///
    /// # Errors
    ///
    /// - `NoActiveSubscription` if the user holds none
    /// - `ConcurrentModification` if retries are exhausted
    /// - `PersistenceFailure` on storage failure or timeout
    pub async fn cancel(&self, user_id: &UserId) -> Result<Subscription, SubscriptionError> {
        self.bounded(
            "cancel",
            self.retrying("cancel", move || self.try_cancel(user_id)),
        )
        .await
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Queries
    // ════════════════════════════════════════════════════════════════════════════

    /// Returns the user's active subscription.
    pub async fn get_active(&self, user_id: &UserId) -> Result<Subscription, SubscriptionError> {
        self.bounded("get_active", async {
            self.reader
                .find_active(user_id)
                .await?
                .ok_or_else(|| SubscriptionError::no_active_subscription(user_id.clone()))
        })
        .await
    }

    /// Returns every history entry of the user, newest first.
    ///
    /// Empty for a user that never held a subscription.
    pub async fn get_history(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>, SubscriptionError> {
        self.bounded("get_history", async {
            Ok(self.reader.history_for_user(user_id).await?)
        })
        .await
    }

    /// Returns every subscription period of the user, newest first.
    pub async fn list_subscriptions(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        self.bounded("list_subscriptions", async {
            Ok(self.reader.list_for_user(user_id).await?)
        })
        .await
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Single attempts
    // ════════════════════════════════════════════════════════════════════════════

    async fn try_assign(
        &self,
        user_id: &UserId,
        plan: &Plan,
    ) -> Result<Subscription, SubscriptionError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let previous = tx.subscriptions().find_active_for_update(user_id).await?;
        if let Some(previous) = &previous {
            let mut closing = previous.clone();
            closing.cancel(now)?;
            tx.subscriptions().update(&closing).await?;
            self.recorder
                .record(
                    tx.history(),
                    HistoryEntry::canceled(&closing, now)
                        .with_metadata("reason", "replaced")
                        .with_metadata("replaced_by_plan_id", plan.id.to_string()),
                )
                .await?;
        }

        let subscription = Subscription::start(SubscriptionId::new(), user_id.clone(), plan, now);
        tx.subscriptions().insert(&subscription).await?;
        let entry = match &previous {
            Some(previous) => HistoryEntry::replaced(&subscription, previous, now),
            None => HistoryEntry::assigned(&subscription, now),
        };
        self.recorder.record(tx.history(), entry).await?;
        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            plan_id = %plan.id,
            subscription_id = %subscription.id,
            replaced = previous.is_some(),
            expires_at = %subscription.expires_at,
            "plan assigned"
        );
        Ok(subscription)
    }

    async fn try_renew(
        &self,
        user_id: &UserId,
        new_expiry: Timestamp,
    ) -> Result<Subscription, SubscriptionError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut subscription = tx
            .subscriptions()
            .find_active_for_update(user_id)
            .await?
            .ok_or_else(|| SubscriptionError::no_active_subscription(user_id.clone()))?;
        let previous_expiry = subscription.renew(new_expiry, now)?;
        tx.subscriptions().update(&subscription).await?;
        self.recorder
            .record(
                tx.history(),
                HistoryEntry::renewed(&subscription, previous_expiry, now),
            )
            .await?;
        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            previous_expires_at = %previous_expiry,
            expires_at = %subscription.expires_at,
            "plan renewed"
        );
        Ok(subscription)
    }

    async fn try_cancel(&self, user_id: &UserId) -> Result<Subscription, SubscriptionError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut subscription = tx
            .subscriptions()
            .find_active_for_update(user_id)
            .await?
            .ok_or_else(|| SubscriptionError::no_active_subscription(user_id.clone()))?;
        subscription.cancel(now)?;
        tx.subscriptions().update(&subscription).await?;
        self.recorder
            .record(tx.history(), HistoryEntry::canceled(&subscription, now))
            .await?;
        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            "plan canceled"
        );
        Ok(subscription)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Retry and deadline
    // ════════════════════════════════════════════════════════════════════════════

    /// Repeats `attempt` while it fails with a retryable error, up to
    /// `max_retries` extra times.
    async fn retrying<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, SubscriptionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SubscriptionError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(err) if err.is_retryable() && retries < self.config.max_retries => {
                    retries += 1;
                    tracing::warn!(
                        operation,
                        retry = retries,
                        error = %err,
                        "write conflict, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff * retries).await;
                }
                result => return result,
            }
        }
    }

    /// Fails with `PersistenceFailure` if `fut` outlives the operation timeout.
    ///
    /// The in-flight transaction is dropped, which rolls it back.
    async fn bounded<T, Fut>(
        &self,
        operation: &'static str,
        fut: Fut,
    ) -> Result<T, SubscriptionError>
    where
        Fut: Future<Output = Result<T, SubscriptionError>>,
    {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.config.operation_timeout.as_millis() as u64,
                    "operation deadline exceeded"
                );
                Err(SubscriptionError::persistence(format!(
                    "{} deadline exceeded",
                    operation
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::FixedClock;
    use crate::adapters::memory::InMemorySubscriptionStore;
    use crate::domain::foundation::ErrorCode;
    use crate::domain::subscription::{HistoryAction, SubscriptionStatus};
    use chrono::{TimeZone, Utc};

    fn at(m: u32, d: u32, h: u32) -> Timestamp {
        Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, m, d, h, 0, 0).unwrap())
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    struct Fixture {
        store: InMemorySubscriptionStore,
        clock: Arc<FixedClock>,
        ledger: SubscriptionLedger,
        monthly: Plan,
        yearly: Plan,
    }

    fn fixture() -> Fixture {
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
            LedgerConfig::default().with_retry_backoff(Duration::from_millis(1)),
        );
        Fixture {
            store,
            clock,
            ledger,
            monthly,
            yearly,
        }
    }

    #[tokio::test]
    async fn assign_creates_active_subscription_and_entry() {
        let f = fixture();

        let sub = f.ledger.assign(&user(), &f.monthly.id).await.unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.expires_at, at(1, 31, 9));
        let history = f.ledger.get_history(&user()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Assign);
        assert_eq!(history[0].old_plan_id, None);
        assert_eq!(history[0].new_plan_id, Some(f.monthly.id));
    }

    #[tokio::test]
    async fn assign_replaces_active_subscription() {
        let f = fixture();
        let first = f.ledger.assign(&user(), &f.monthly.id).await.unwrap();
        f.clock.set(at(1, 10, 12));

        let second = f.ledger.assign(&user(), &f.yearly.id).await.unwrap();

        let all = f.store.all_subscriptions();
        let closed = all.iter().find(|s| s.id == first.id).unwrap();
        assert_eq!(closed.status, SubscriptionStatus::Canceled);
        assert_eq!(closed.expires_at, at(1, 10, 12));
        assert_eq!(f.ledger.get_active(&user()).await.unwrap(), second);

        let history = f.ledger.get_history(&user()).await.unwrap();
        let actions: Vec<_> = history.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![HistoryAction::Assign, HistoryAction::Cancel, HistoryAction::Assign]
        );
        assert_eq!(history[0].old_plan_id, Some(f.monthly.id));
        assert_eq!(history[1].metadata.get("reason").map(String::as_str), Some("replaced"));
    }

    #[tokio::test]
    async fn assign_unknown_plan_fails_without_writes() {
        let f = fixture();
        let missing = PlanId::new();

        let err = f.ledger.assign(&user(), &missing).await.unwrap_err();

        assert_eq!(err, SubscriptionError::PlanNotFound(missing));
        assert!(f.store.all_subscriptions().is_empty());
    }

    #[tokio::test]
    async fn assign_inactive_plan_is_rejected() {
        let f = fixture();
        f.ledger.catalog().set_active(&f.monthly.id, false).await.unwrap();

        let err = f.ledger.assign(&user(), &f.monthly.id).await.unwrap_err();

        assert_eq!(err, SubscriptionError::PlanNotFound(f.monthly.id));
    }

    #[tokio::test]
    async fn renew_accepts_earlier_date_and_truncates() {
        let f = fixture();
        f.ledger.assign(&user(), &f.monthly.id).await.unwrap();

        let renewed = f.ledger.renew(&user(), at(1, 15, 18)).await.unwrap();

        assert_eq!(renewed.expires_at, at(1, 15, 0));
        let history = f.ledger.get_history(&user()).await.unwrap();
        assert_eq!(history[0].action, HistoryAction::Renew);
        assert_eq!(history[0].old_plan_id, Some(f.monthly.id));
        assert_eq!(history[0].new_plan_id, Some(f.monthly.id));
    }

    #[tokio::test]
    async fn renew_without_active_subscription_fails() {
        let f = fixture();

        let err = f.ledger.renew(&user(), at(3, 1, 0)).await.unwrap_err();

        assert_eq!(err, SubscriptionError::NoActiveSubscription(user()));
    }

    #[tokio::test]
    async fn cancel_closes_and_records() {
        let f = fixture();
        f.ledger.assign(&user(), &f.monthly.id).await.unwrap();
        f.clock.set(at(1, 5, 0));

        let canceled = f.ledger.cancel(&user()).await.unwrap();

        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
        assert_eq!(canceled.expires_at, at(1, 5, 0));
        assert_eq!(
            f.ledger.get_active(&user()).await.unwrap_err(),
            SubscriptionError::NoActiveSubscription(user())
        );
        assert_eq!(
            f.ledger.cancel(&user()).await.unwrap_err().code(),
            ErrorCode::NoActiveSubscription
        );
    }

    #[tokio::test]
    async fn history_write_failure_rolls_back_subscription() {
        let f = fixture();
        f.store.fail_history_appends(true);

        let err = f.ledger.assign(&user(), &f.monthly.id).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::PersistenceFailure(_)));
        assert!(f.store.all_subscriptions().is_empty());
        assert!(f.store.all_history().is_empty());
    }

    #[tokio::test]
    async fn conflicts_are_retried() {
        let f = fixture();
        f.store.force_conflicts(2);

        let sub = f.ledger.assign(&user(), &f.monthly.id).await.unwrap();

        assert!(sub.is_active());
        assert_eq!(f.store.pending_conflicts(), 0);
    }

    #[tokio::test]
    async fn conflicts_surface_after_retries_exhausted() {
        let f = fixture();
        f.store.force_conflicts(10);

        let err = f.ledger.assign(&user(), &f.monthly.id).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::ConcurrentModification(_)));
        assert_eq!(f.store.pending_conflicts(), 6);
        assert!(f.store.all_subscriptions().is_empty());
    }

    #[tokio::test]
    async fn list_subscriptions_returns_every_period() {
        let f = fixture();
        f.ledger.assign(&user(), &f.monthly.id).await.unwrap();
        f.clock.set(at(2, 1, 0));
        let latest = f.ledger.assign(&user(), &f.yearly.id).await.unwrap();

        let periods = f.ledger.list_subscriptions(&user()).await.unwrap();

        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0], latest);
    }
}
