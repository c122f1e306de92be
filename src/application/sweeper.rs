//! ExpirationSweeper - batch expiry of subscriptions past their end instant.
//!
//! Candidates are read without locks in keyset-ordered batches. Each one is
//! then expired in its own transaction after being re-read under a row lock
//! and re-checked, so running several sweepers at once, or the same sweep
//! twice, never expires a record twice or writes a second history entry.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `batch_size` | 100 | Candidates read per batch |
//! | `max_batches` | none | Optional cap on batches per sweep |
//! | `interval` | 1h | Pause between sweeps in [`ExpirationSweeper::run`] |
//! | `default_expiring_days` | 7 | Window used when callers give none |
//!
//! ## Graceful Shutdown
//!
//! `run` and `sweep_interruptible` check the shutdown signal between
//! batches and never stop in the middle of a record.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time;

use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::domain::subscription::{HistoryEntry, Subscription, SubscriptionError};
use crate::ports::{Clock, ExpiryCursor, SubscriptionReader, UnitOfWork};

use super::HistoryRecorder;

/// Configuration for the ExpirationSweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub batch_size: u32,
    pub max_batches: Option<u32>,
    pub interval: Duration,
    pub default_expiring_days: u32,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_batches: None,
            interval: Duration::from_secs(3600),
            default_expiring_days: 7,
        }
    }
}

impl SweeperConfig {
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_max_batches(mut self, max: Option<u32>) -> Self {
        self.max_batches = max;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Subscriptions transitioned to expired by this sweep.
    pub expired: u64,
    /// Candidates another writer got to first.
    pub skipped: u64,
    /// Candidates whose transaction failed.
    pub failed: u64,
    pub batches: u32,
    /// True if a shutdown signal stopped the sweep early.
    pub interrupted: bool,
}

enum RecordOutcome {
    Expired,
    Skipped,
}

/// Expires active subscriptions whose expiry instant has passed.
pub struct ExpirationSweeper {
    store: Arc<dyn UnitOfWork>,
    reader: Arc<dyn SubscriptionReader>,
    recorder: HistoryRecorder,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl ExpirationSweeper {
    pub fn new(
        store: Arc<dyn UnitOfWork>,
        reader: Arc<dyn SubscriptionReader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_config(store, reader, clock, SweeperConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn UnitOfWork>,
        reader: Arc<dyn SubscriptionReader>,
        clock: Arc<dyn Clock>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            store,
            reader,
            recorder: HistoryRecorder::new(),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Expires every active subscription with `expires_at <= now`.
    ///
    /// # Errors
    ///
    /// `PersistenceFailure` only if candidates cannot be listed. Failures of
    /// single records are counted in the report instead.
    pub async fn sweep(&self, now: Timestamp) -> Result<SweepReport, SubscriptionError> {
        self.sweep_until(now, None).await
    }

    /// Like [`sweep`](Self::sweep) but stops before the next batch once
    /// `shutdown` reads `true`.
    pub async fn sweep_interruptible(
        &self,
        now: Timestamp,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<SweepReport, SubscriptionError> {
        self.sweep_until(now, Some(shutdown)).await
    }

    /// Active subscriptions ending within `(now, now + days]`, earliest first.
    ///
    /// # Errors
    ///
    /// `ValidationFailed` when `now + days` is not a representable instant.
    pub async fn list_expiring_within(
        &self,
        days: u32,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let now = self.clock.now();
        let until = now.checked_add_days(i64::from(days)).ok_or_else(|| {
            SubscriptionError::validation("days", format!("{days} days is out of range"))
        })?;
        Ok(self.reader.list_expiring_between(now, until).await?)
    }

    /// Run the sweep loop until shutdown signal is received.
    ///
    /// The first sweep starts immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), SubscriptionError> {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("expiration sweeper stopping");
                        return Ok(());
                    }
                }

                _ = interval.tick() => {
                    if let Err(err) = self.sweep_interruptible(self.clock.now(), &shutdown).await {
                        tracing::error!(error = %err, "sweep failed");
                    }
                }
            }
        }
    }

    async fn sweep_until(
        &self,
        now: Timestamp,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<SweepReport, SubscriptionError> {
        let mut report = SweepReport::default();
        let mut cursor: Option<ExpiryCursor> = None;

        loop {
            if self
                .config
                .max_batches
                .is_some_and(|max| report.batches >= max)
            {
                break;
            }
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                report.interrupted = true;
                break;
            }

            let batch = self
                .reader
                .list_due_for_expiry(now, cursor.as_ref(), self.config.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            report.batches += 1;
            cursor = batch.last().map(ExpiryCursor::after);

            for candidate in &batch {
                match self.expire_one(candidate.id, now).await {
                    Ok(RecordOutcome::Expired) => report.expired += 1,
                    Ok(RecordOutcome::Skipped) => report.skipped += 1,
                    Err(err) if err.is_retryable() => {
                        tracing::debug!(
                            subscription_id = %candidate.id,
                            error = %err,
                            "candidate changed concurrently, skipping"
                        );
                        report.skipped += 1;
                    }
                    Err(err) => {
                        tracing::warn!(
                            subscription_id = %candidate.id,
                            user_id = %candidate.user_id,
                            error = %err,
                            "failed to expire subscription"
                        );
                        report.failed += 1;
                    }
                }
            }

            if batch.len() < self.config.batch_size as usize {
                break;
            }
        }

        tracing::info!(
            now = %now,
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            batches = report.batches,
            interrupted = report.interrupted,
            "expiration sweep finished"
        );
        Ok(report)
    }

    async fn expire_one(
        &self,
        id: SubscriptionId,
        now: Timestamp,
    ) -> Result<RecordOutcome, SubscriptionError> {
        let mut tx = self.store.begin().await?;

        let mut subscription = match tx.subscriptions().find_by_id_for_update(&id).await? {
            Some(sub) if sub.is_due_for_expiry(now) => sub,
            _ => {
                tx.rollback().await?;
                return Ok(RecordOutcome::Skipped);
            }
        };

        subscription.expire(now)?;
        tx.subscriptions().update(&subscription).await?;
        self.recorder
            .record(tx.history(), HistoryEntry::expired(&subscription, now))
            .await?;
        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            plan_id = %subscription.plan_id,
            "subscription expired"
        );
        Ok(RecordOutcome::Expired)
    }
}
