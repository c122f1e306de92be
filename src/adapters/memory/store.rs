//! In-memory plan, subscription and history storage.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::transaction::MemoryTransaction;
use crate::domain::foundation::{
    DomainError, ErrorCode, PlanId, SubscriptionId, Timestamp, UserId,
};
use crate::domain::subscription::{HistoryEntry, Plan, Subscription};
use crate::ports::{
    ExpiryCursor, PlanRepository, SubscriptionReader, Transaction, UnitOfWork,
};

/// Committed state shared by the store and its transactions.
#[derive(Debug, Default)]
pub(super) struct MemoryState {
    pub(super) plans: HashMap<PlanId, Plan>,
    /// Insertion order is kept for stable tie-breaking.
    pub(super) subscriptions: Vec<Subscription>,
    /// `(seq, entry)` pairs in append order.
    pub(super) history: Vec<(u64, HistoryEntry)>,
    pub(super) next_seq: u64,
}

/// Failures injected by tests.
#[derive(Debug, Default)]
pub(super) struct Faults {
    pub(super) fail_history_appends: bool,
    pub(super) fail_subscription_writes: bool,
    pub(super) fail_commits: bool,
    pub(super) fail_history_for: HashSet<SubscriptionId>,
    pub(super) forced_conflicts: u32,
}

pub(super) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, DomainError> {
    mutex
        .lock()
        .map_err(|_| DomainError::new(ErrorCode::InternalError, "In-memory store lock poisoned"))
}

/// In-memory implementation of [`PlanRepository`], [`UnitOfWork`] and
/// [`SubscriptionReader`].
///
/// Transactions stage their writes and apply them under one lock at commit,
/// after checking subscription versions and the one-active-per-user rule.
/// Cloning shares the underlying state.
///
/// # Example
///
/// ```ignore
/// let store = InMemorySubscriptionStore::new().with_plan(plan);
/// store.fail_history_appends(true);
/// assert!(ledger.assign(&user, plan_id).await.is_err());
/// assert!(store.all_subscriptions().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemorySubscriptionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plan and returns the store, builder style.
    pub fn with_plan(self, plan: Plan) -> Self {
        self.add_plan(plan);
        self
    }

    /// Adds or replaces a plan.
    pub fn add_plan(&self, plan: Plan) {
        self.state_guard().plans.insert(plan.id, plan);
    }

    // === Test Helpers ===

    /// Every committed subscription in insertion order.
    pub fn all_subscriptions(&self) -> Vec<Subscription> {
        self.state_guard().subscriptions.clone()
    }

    /// Every committed history entry in append order.
    pub fn all_history(&self) -> Vec<HistoryEntry> {
        self.state_guard()
            .history
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Makes every history append fail.
    pub fn fail_history_appends(&self, fail: bool) {
        self.faults_guard().fail_history_appends = fail;
    }

    /// Makes every subscription insert or update fail.
    pub fn fail_subscription_writes(&self, fail: bool) {
        self.faults_guard().fail_subscription_writes = fail;
    }

    /// Makes every commit fail.
    pub fn fail_commits(&self, fail: bool) {
        self.faults_guard().fail_commits = fail;
    }

    /// Makes history appends for one subscription fail.
    pub fn fail_history_for(&self, id: SubscriptionId) {
        self.faults_guard().fail_history_for.insert(id);
    }

    /// Makes the next `count` commits fail with a version conflict.
    pub fn force_conflicts(&self, count: u32) {
        self.faults_guard().forced_conflicts = count;
    }

    /// Conflicts still queued by [`force_conflicts`](Self::force_conflicts).
    pub fn pending_conflicts(&self) -> u32 {
        self.faults_guard().forced_conflicts
    }

    fn state_guard(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn faults_guard(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PlanRepository for InMemorySubscriptionStore {
    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        Ok(lock(&self.state)?.plans.get(id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Plan>, DomainError> {
        let state = lock(&self.state)?;
        let mut plans: Vec<Plan> = state.plans.values().filter(|p| p.is_active).cloned().collect();
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    async fn set_active(&self, id: &PlanId, is_active: bool) -> Result<Plan, DomainError> {
        let mut state = lock(&self.state)?;
        let plan = state.plans.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::PlanNotFound, format!("Plan not found: {}", id))
        })?;
        plan.is_active = is_active;
        Ok(plan.clone())
    }
}

#[async_trait]
impl UnitOfWork for InMemorySubscriptionStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DomainError> {
        Ok(Box::new(MemoryTransaction::new(
            Arc::clone(&self.state),
            Arc::clone(&self.faults),
        )))
    }
}

#[async_trait]
impl SubscriptionReader for InMemorySubscriptionStore {
    async fn find_active(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        let state = lock(&self.state)?;
        Ok(state
            .subscriptions
            .iter()
            .find(|s| &s.user_id == user_id && s.is_active())
            .cloned())
    }

    async fn history_for_user(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>, DomainError> {
        let state = lock(&self.state)?;
        let owned: HashSet<SubscriptionId> = state
            .subscriptions
            .iter()
            .filter(|s| &s.user_id == user_id)
            .map(|s| s.id)
            .collect();
        let mut entries: Vec<&(u64, HistoryEntry)> = state
            .history
            .iter()
            .filter(|(_, e)| owned.contains(&e.subscription_id))
            .collect();
        entries.sort_by(|(seq_a, a), (seq_b, b)| {
            b.changed_at.cmp(&a.changed_at).then(seq_b.cmp(seq_a))
        });
        Ok(entries.into_iter().map(|(_, e)| e.clone()).collect())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        let state = lock(&self.state)?;
        let mut subs: Vec<Subscription> = state
            .subscriptions
            .iter()
            .rev()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort keeps later insertions first among equal start dates.
        subs.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(subs)
    }

    async fn list_due_for_expiry(
        &self,
        now: Timestamp,
        after: Option<&ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError> {
        let state = lock(&self.state)?;
        let mut due: Vec<Subscription> = state
            .subscriptions
            .iter()
            .filter(|s| s.is_due_for_expiry(now))
            .filter(|s| match after {
                Some(cursor) => (s.expires_at, s.id) > (cursor.expires_at, cursor.id),
                None => true,
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| (a.expires_at, a.id).cmp(&(b.expires_at, b.id)));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn list_expiring_between(
        &self,
        from: Timestamp,
        until: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError> {
        let state = lock(&self.state)?;
        let mut expiring: Vec<Subscription> = state
            .subscriptions
            .iter()
            .filter(|s| s.is_expiring_between(from, until))
            .cloned()
            .collect();
        expiring.sort_by(|a, b| (a.expires_at, a.id).cmp(&(b.expires_at, b.id)));
        Ok(expiring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::SubscriptionStatus;
    use chrono::{TimeZone, Utc};

    fn at(d: u32) -> Timestamp {
        Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap())
    }

    fn plan(name: &str, days: u32) -> Plan {
        Plan::new(PlanId::new(), name, days).unwrap()
    }

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    async fn seed(store: &InMemorySubscriptionStore, sub: &Subscription) {
        let mut tx = store.begin().await.unwrap();
        tx.subscriptions().insert(sub).await.unwrap();
        tx.history()
            .append(&HistoryEntry::assigned(sub, sub.start_date))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let store = InMemorySubscriptionStore::new();
        let sub = Subscription::start(SubscriptionId::new(), user("a"), &plan("P", 10), at(1));

        seed(&store, &sub).await;

        assert_eq!(store.find_active(&user("a")).await.unwrap(), Some(sub));
        assert_eq!(store.all_history().len(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = InMemorySubscriptionStore::new();
        let sub = Subscription::start(SubscriptionId::new(), user("a"), &plan("P", 10), at(1));

        {
            let mut tx = store.begin().await.unwrap();
            tx.subscriptions().insert(&sub).await.unwrap();
            tx.history()
                .append(&HistoryEntry::assigned(&sub, at(1)))
                .await
                .unwrap();
        }

        assert!(store.all_subscriptions().is_empty());
        assert!(store.all_history().is_empty());
    }

    #[tokio::test]
    async fn transaction_reads_its_own_writes() {
        let store = InMemorySubscriptionStore::new();
        let sub = Subscription::start(SubscriptionId::new(), user("a"), &plan("P", 10), at(1));

        let mut tx = store.begin().await.unwrap();
        tx.subscriptions().insert(&sub).await.unwrap();
        let seen = tx.subscriptions().find_active_for_update(&user("a")).await.unwrap();

        assert_eq!(seen, Some(sub));
        assert!(store.find_active(&user("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_active_insert_for_user_conflicts() {
        let store = InMemorySubscriptionStore::new();
        let p = plan("P", 10);
        seed(&store, &Subscription::start(SubscriptionId::new(), user("a"), &p, at(1))).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .subscriptions()
            .insert(&Subscription::start(SubscriptionId::new(), user("a"), &p, at(2)))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::ConcurrentModification);
    }

    #[tokio::test]
    async fn racing_first_assignments_conflict_at_commit() {
        let store = InMemorySubscriptionStore::new();
        let p = plan("P", 10);

        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        tx1.subscriptions()
            .insert(&Subscription::start(SubscriptionId::new(), user("a"), &p, at(1)))
            .await
            .unwrap();
        tx2.subscriptions()
            .insert(&Subscription::start(SubscriptionId::new(), user("a"), &p, at(1)))
            .await
            .unwrap();

        tx1.commit().await.unwrap();
        let err = tx2.commit().await.unwrap_err();

        assert_eq!(err.code, ErrorCode::ConcurrentModification);
        assert_eq!(store.all_subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn stale_update_conflicts_at_commit() {
        let store = InMemorySubscriptionStore::new();
        let sub = Subscription::start(SubscriptionId::new(), user("a"), &plan("P", 10), at(1));
        seed(&store, &sub).await;

        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        let mut first = tx1.subscriptions().find_by_id_for_update(&sub.id).await.unwrap().unwrap();
        let mut second = tx2.subscriptions().find_by_id_for_update(&sub.id).await.unwrap().unwrap();
        first.cancel(at(2)).unwrap();
        second.expire(at(2)).unwrap();
        tx1.subscriptions().update(&first).await.unwrap();
        tx2.subscriptions().update(&second).await.unwrap();

        tx1.commit().await.unwrap();
        assert!(tx2.commit().await.is_err());

        let stored = &store.all_subscriptions()[0];
        assert_eq!(stored.status, SubscriptionStatus::Canceled);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn forced_conflicts_are_consumed() {
        let store = InMemorySubscriptionStore::new();
        store.force_conflicts(1);

        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_err());
        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_ok());
        assert_eq!(store.pending_conflicts(), 0);
    }

    #[tokio::test]
    async fn history_is_newest_first_with_insertion_tiebreak() {
        let store = InMemorySubscriptionStore::new();
        let mut sub = Subscription::start(SubscriptionId::new(), user("a"), &plan("P", 10), at(1));
        seed(&store, &sub).await;

        let mut tx = store.begin().await.unwrap();
        sub.cancel(at(1)).unwrap();
        tx.subscriptions().update(&sub).await.unwrap();
        tx.history().append(&HistoryEntry::canceled(&sub, at(1))).await.unwrap();
        tx.commit().await.unwrap();

        let history = store.history_for_user(&user("a")).await.unwrap();
        let actions: Vec<&str> = history.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["cancel", "assign"]);
        assert!(store.history_for_user(&user("nobody")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn due_listing_pages_by_cursor() {
        let store = InMemorySubscriptionStore::new();
        let p = plan("P", 1);
        for (name, day) in [("a", 1), ("b", 2), ("c", 3)] {
            seed(&store, &Subscription::start(SubscriptionId::new(), user(name), &p, at(day))).await;
        }

        let first = store.list_due_for_expiry(at(10), None, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].user_id, user("a"));

        let cursor = ExpiryCursor::after(&first[1]);
        let rest = store.list_due_for_expiry(at(10), Some(&cursor), 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].user_id, user("c"));
    }

    #[tokio::test]
    async fn list_active_plans_skips_inactive() {
        let basic = plan("Basic", 30);
        let legacy = plan("Legacy", 30).with_active(false);
        let store = InMemorySubscriptionStore::new()
            .with_plan(basic.clone())
            .with_plan(legacy.clone());

        assert_eq!(store.list_active().await.unwrap(), vec![basic]);

        let toggled = store.set_active(&legacy.id, true).await.unwrap();
        assert!(toggled.is_active);
        assert_eq!(store.list_active().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn set_active_on_unknown_plan_fails() {
        let store = InMemorySubscriptionStore::new();
        let err = store.set_active(&PlanId::new(), false).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanNotFound);
    }
}
