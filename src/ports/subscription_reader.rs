//! Subscription reader port (read side).
//!
//! Non-locking queries used by read operations and by the sweeper to find
//! candidates. The sweeper re-reads every candidate under a lock before
//! changing it, so results here may be slightly stale.

use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{HistoryEntry, Subscription};
use async_trait::async_trait;

/// Keyset position in the `(expires_at, id)` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryCursor {
    pub expires_at: Timestamp,
    pub id: SubscriptionId,
}

impl ExpiryCursor {
    /// Cursor positioned right after `subscription`.
    pub fn after(subscription: &Subscription) -> Self {
        Self {
            expires_at: subscription.expires_at,
            id: subscription.id,
        }
    }
}

/// Reader port for subscription queries.
#[async_trait]
pub trait SubscriptionReader: Send + Sync {
    /// Get the user's active subscription.
    ///
    /// Returns `None` if the user has none.
    async fn find_active(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError>;

    /// All history entries of every subscription the user ever held.
    ///
    /// Newest first; entries with equal `changed_at` come in reverse
    /// insertion order. Empty for an unknown user.
    async fn history_for_user(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>, DomainError>;

    /// Every subscription period of the user, newest `start_date` first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError>;

    /// Active subscriptions with `expires_at <= now`, ordered by `(expires_at, id)`.
    ///
    /// When `after` is set only rows strictly after that position are returned.
    async fn list_due_for_expiry(
        &self,
        now: Timestamp,
        after: Option<&ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError>;

    /// Active subscriptions with `from < expires_at <= until`, earliest first.
    async fn list_expiring_between(
        &self,
        from: Timestamp,
        until: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError>;
}
