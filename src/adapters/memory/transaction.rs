//! Staged transaction over the in-memory store.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::store::{lock, Faults, MemoryState};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, UserId};
use crate::domain::subscription::{HistoryEntry, Subscription};
use crate::ports::{HistoryRepository, SubscriptionRepository, Transaction};

/// Update of a committed row, remembering the version it was read at.
#[derive(Debug)]
struct StagedUpdate {
    base_version: i64,
    subscription: Subscription,
}

/// Writes buffered until commit. Dropping discards them.
pub(super) struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Mutex<Faults>>,
    inserted: Vec<Subscription>,
    updated: Vec<StagedUpdate>,
    appended: Vec<HistoryEntry>,
}

impl MemoryTransaction {
    pub(super) fn new(state: Arc<Mutex<MemoryState>>, faults: Arc<Mutex<Faults>>) -> Self {
        Self {
            state,
            faults,
            inserted: Vec::new(),
            updated: Vec::new(),
            appended: Vec::new(),
        }
    }

    /// Committed rows overlaid with this transaction's staged writes.
    fn view(&self) -> Result<Vec<Subscription>, DomainError> {
        let state = lock(&self.state)?;
        let mut rows: Vec<Subscription> = state
            .subscriptions
            .iter()
            .map(|row| {
                self.updated
                    .iter()
                    .find(|u| u.subscription.id == row.id)
                    .map(|u| u.subscription.clone())
                    .unwrap_or_else(|| row.clone())
            })
            .collect();
        rows.extend(self.inserted.iter().cloned());
        Ok(rows)
    }

    fn check_write_fault(&self) -> Result<(), DomainError> {
        if lock(&self.faults)?.fail_subscription_writes {
            return Err(DomainError::database("Injected subscription write failure"));
        }
        Ok(())
    }
}

fn version_conflict(id: &SubscriptionId, expected: i64, found: i64) -> DomainError {
    DomainError::conflict(format!("Subscription {} was modified concurrently", id))
        .with_detail("expected_version", expected.to_string())
        .with_detail("found_version", found.to_string())
}

#[async_trait]
impl SubscriptionRepository for MemoryTransaction {
    async fn find_active_for_update(
        &mut self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .view()?
            .into_iter()
            .find(|s| &s.user_id == user_id && s.is_active()))
    }

    async fn find_by_id_for_update(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self.view()?.into_iter().find(|s| &s.id == id))
    }

    async fn insert(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        self.check_write_fault()?;
        let view = self.view()?;
        if view.iter().any(|s| s.id == subscription.id) {
            return Err(DomainError::conflict(format!(
                "Subscription {} already exists",
                subscription.id
            )));
        }
        if subscription.is_active()
            && view
                .iter()
                .any(|s| s.user_id == subscription.user_id && s.is_active())
        {
            return Err(DomainError::conflict(format!(
                "User {} already has an active subscription",
                subscription.user_id
            )));
        }
        self.inserted.push(subscription.clone());
        Ok(())
    }

    async fn update(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        self.check_write_fault()?;
        let expected = subscription.version - 1;

        if let Some(row) = self.inserted.iter_mut().find(|s| s.id == subscription.id) {
            if row.version != expected {
                return Err(version_conflict(&subscription.id, expected, row.version));
            }
            *row = subscription.clone();
            return Ok(());
        }

        if let Some(staged) = self
            .updated
            .iter_mut()
            .find(|u| u.subscription.id == subscription.id)
        {
            if staged.subscription.version != expected {
                return Err(version_conflict(
                    &subscription.id,
                    expected,
                    staged.subscription.version,
                ));
            }
            staged.subscription = subscription.clone();
            return Ok(());
        }

        let found = lock(&self.state)?
            .subscriptions
            .iter()
            .find(|s| s.id == subscription.id)
            .map(|s| s.version);
        match found {
            None => Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription not found: {}", subscription.id),
            )),
            Some(version) if version != expected => {
                Err(version_conflict(&subscription.id, expected, version))
            }
            Some(version) => {
                self.updated.push(StagedUpdate {
                    base_version: version,
                    subscription: subscription.clone(),
                });
                Ok(())
            }
        }
    }
}

#[async_trait]
impl HistoryRepository for MemoryTransaction {
    async fn append(&mut self, entry: &HistoryEntry) -> Result<(), DomainError> {
        {
            let faults = lock(&self.faults)?;
            if faults.fail_history_appends
                || faults.fail_history_for.contains(&entry.subscription_id)
            {
                return Err(DomainError::database("Injected history append failure"));
            }
        }
        self.appended.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn subscriptions(&mut self) -> &mut dyn SubscriptionRepository {
        self
    }

    fn history(&mut self) -> &mut dyn HistoryRepository {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let this = *self;
        {
            let mut faults = lock(&this.faults)?;
            if faults.fail_commits {
                return Err(DomainError::database("Injected commit failure"));
            }
            if faults.forced_conflicts > 0 {
                faults.forced_conflicts -= 1;
                return Err(DomainError::conflict("Injected write conflict"));
            }
        }

        let mut state = lock(&this.state)?;

        for staged in &this.updated {
            let id = staged.subscription.id;
            let current = state
                .subscriptions
                .iter()
                .find(|s| s.id == id)
                .map(|s| s.version)
                .ok_or_else(|| {
                    DomainError::new(
                        ErrorCode::SubscriptionNotFound,
                        format!("Subscription not found: {}", id),
                    )
                })?;
            if current != staged.base_version {
                return Err(version_conflict(&id, staged.base_version, current));
            }
        }
        for sub in &this.inserted {
            if state.subscriptions.iter().any(|s| s.id == sub.id) {
                return Err(DomainError::conflict(format!(
                    "Subscription {} already exists",
                    sub.id
                )));
            }
        }

        let mut next = state.subscriptions.clone();
        for staged in &this.updated {
            if let Some(row) = next.iter_mut().find(|s| s.id == staged.subscription.id) {
                *row = staged.subscription.clone();
            }
        }
        next.extend(this.inserted.iter().cloned());

        let touched: HashSet<&UserId> = this
            .inserted
            .iter()
            .chain(this.updated.iter().map(|u| &u.subscription))
            .map(|s| &s.user_id)
            .collect();
        for user_id in touched {
            let active = next
                .iter()
                .filter(|s| &s.user_id == user_id && s.is_active())
                .count();
            if active > 1 {
                return Err(DomainError::conflict(format!(
                    "User {} already has an active subscription",
                    user_id
                )));
            }
        }

        state.subscriptions = next;
        for entry in this.appended {
            state.next_seq += 1;
            let seq = state.next_seq;
            state.history.push((seq, entry));
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}
