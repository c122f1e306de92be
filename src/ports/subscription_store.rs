//! Subscription store port (write side).
//!
//! Writes go through an explicit unit of work. A [`Transaction`] hands out
//! the subscription and history repositories that share its scope, so a
//! subscription change and the history entry documenting it either commit
//! together or not at all.
//!
//! # Design
//!
//! - **Scoped**: repositories are only reachable through a live transaction
//! - **Rollback on drop**: a transaction dropped without `commit` is rolled back
//! - **Optimistic locking**: `update` is a compare-and-swap on `version`
//!
//! # Example
//!
//! ```ignore
//! async fn cancel(
//!     store: &dyn UnitOfWork,
//!     user_id: &UserId,
//!     now: Timestamp,
//! ) -> Result<(), DomainError> {
//!     let mut tx = store.begin().await?;
//!     let mut sub = tx
//!         .subscriptions()
//!         .find_active_for_update(user_id)
//!         .await?
//!         .ok_or_else(|| DomainError::new(ErrorCode::NoActiveSubscription, "none"))?;
//!     sub.cancel(now)?;
//!     tx.subscriptions().update(&sub).await?;
//!     tx.history().append(&HistoryEntry::canceled(&sub, now)).await?;
//!     tx.commit().await
//! }
//! ```

use crate::domain::foundation::{DomainError, SubscriptionId, UserId};
use crate::domain::subscription::{HistoryEntry, Subscription};
use async_trait::async_trait;

/// Opens transactions over subscription and history storage.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Begin a new transaction.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` if no connection could be acquired
    async fn begin(&self) -> Result<Box<dyn Transaction>, DomainError>;
}

/// One open transaction.
///
/// Dropping a transaction without calling [`Transaction::commit`] discards
/// every write made through it.
#[async_trait]
pub trait Transaction: Send {
    /// Subscription repository bound to this transaction.
    fn subscriptions(&mut self) -> &mut dyn SubscriptionRepository;

    /// History repository bound to this transaction.
    fn history(&mut self) -> &mut dyn HistoryRepository;

    /// Make every write of this transaction durable.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` if a conflicting write committed first
    /// - `DatabaseError` on persistence failure
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discard every write of this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

/// Transaction-scoped subscription persistence.
#[async_trait]
pub trait SubscriptionRepository: Send {
    /// Find the user's active subscription and lock it until the transaction ends.
    ///
    /// Returns `None` if the user has no active subscription.
    async fn find_active_for_update(
        &mut self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Find a subscription by ID and lock it until the transaction ends.
    ///
    /// Returns `None` if the row doesn't exist or is locked by another
    /// transaction; callers treat both as "someone else has it".
    async fn find_by_id_for_update(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Insert a new subscription.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` if the user already has an active subscription
    /// - `DatabaseError` on persistence failure
    async fn insert(&mut self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Persist a mutated subscription.
    ///
    /// The stored row must still be at `subscription.version - 1`.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` if the stored version differs
    /// - `DatabaseError` on persistence failure
    async fn update(&mut self, subscription: &Subscription) -> Result<(), DomainError>;
}

/// Transaction-scoped, append-only history persistence.
#[async_trait]
pub trait HistoryRepository: Send {
    /// Append one entry.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn append(&mut self, entry: &HistoryEntry) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_of_work_is_object_safe() {
        fn _accepts_dyn(_uow: &dyn UnitOfWork) {}
    }

    #[test]
    fn transaction_is_object_safe() {
        fn _accepts_box(_tx: Box<dyn Transaction>) {}
    }

    #[test]
    fn repositories_are_object_safe() {
        fn _accepts_subs(_repo: &mut dyn SubscriptionRepository) {}
        fn _accepts_history(_repo: &mut dyn HistoryRepository) {}
    }
}
