//! HistoryRecorder - appends audit entries inside an open transaction.

use crate::domain::foundation::DomainError;
use crate::domain::subscription::HistoryEntry;
use crate::ports::HistoryRepository;

/// Appends one immutable entry per subscription transition.
///
/// Only accepts a transaction-scoped [`HistoryRepository`], so an entry can
/// never be written outside the unit of work that made the change.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryRecorder;

impl HistoryRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Appends `entry` and returns it.
    pub async fn record(
        &self,
        history: &mut dyn HistoryRepository,
        entry: HistoryEntry,
    ) -> Result<HistoryEntry, DomainError> {
        history.append(&entry).await?;
        tracing::debug!(
            subscription_id = %entry.subscription_id,
            action = %entry.action,
            entry_id = %entry.id,
            "history entry recorded"
        );
        Ok(entry)
    }
}
