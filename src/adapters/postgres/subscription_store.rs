//! PostgreSQL implementation of the unit of work.
//!
//! One [`PgTransaction`] wraps one `sqlx::Transaction` and serves both the
//! subscription and the history repository, so both writes share it. The
//! underlying sqlx transaction rolls back when dropped uncommitted.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

use super::rows::{db_error, SubscriptionRow, SUBSCRIPTION_COLUMNS};
use crate::domain::foundation::{DomainError, SubscriptionId, UserId};
use crate::domain::subscription::{HistoryEntry, Subscription};
use crate::ports::{HistoryRepository, SubscriptionRepository, Transaction, UnitOfWork};

/// PostgreSQL implementation of the UnitOfWork port.
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWork for PostgresSubscriptionStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

/// Open PostgreSQL transaction.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PgTransaction {
    async fn lock_active_row(
        &mut self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1 AND status = 'active' FOR UPDATE",
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(user_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("Failed to lock active subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }
}

#[async_trait]
impl SubscriptionRepository for PgTransaction {
    async fn find_active_for_update(
        &mut self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        // A lock wait on a row that a concurrent assign just closed re-checks
        // only that row; the replacement it inserted is outside the statement
        // snapshot. A second statement takes a fresh snapshot and sees it.
        match self.lock_active_row(user_id).await? {
            Some(row) => Ok(Some(row)),
            None => self.lock_active_row(user_id).await,
        }
    }

    async fn find_by_id_for_update(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        // SKIP LOCKED: a row held by another sweeper or writer is theirs to change.
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE id = $1 FOR UPDATE SKIP LOCKED",
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("Failed to lock subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn insert(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_id, start_date, expires_at, status, version, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_str())
        .bind(subscription.plan_id.as_uuid())
        .bind(subscription.start_date.as_datetime())
        .bind(subscription.expires_at.as_datetime())
        .bind(subscription.status.as_str())
        .bind(subscription.version)
        .bind(subscription.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to insert subscription", e))?;

        Ok(())
    }

    async fn update(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        let expected_version = subscription.version - 1;
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                plan_id = $2,
                start_date = $3,
                expires_at = $4,
                status = $5,
                version = $6,
                updated_at = $7
            WHERE id = $1 AND version = $8
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.plan_id.as_uuid())
        .bind(subscription.start_date.as_datetime())
        .bind(subscription.expires_at.as_datetime())
        .bind(subscription.status.as_str())
        .bind(subscription.version)
        .bind(subscription.updated_at.as_datetime())
        .bind(expected_version)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to update subscription", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::conflict(format!(
                "Subscription {} was modified concurrently",
                subscription.id
            ))
            .with_detail("expected_version", expected_version.to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl HistoryRepository for PgTransaction {
    async fn append(&mut self, entry: &HistoryEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO plan_history (
                id, subscription_id, action, old_plan_id, new_plan_id, changed_at, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.subscription_id.as_uuid())
        .bind(entry.action.as_str())
        .bind(entry.old_plan_id.map(|id| *id.as_uuid()))
        .bind(entry.new_plan_id.map(|id| *id.as_uuid()))
        .bind(entry.changed_at.as_datetime())
        .bind(sqlx::types::Json(&entry.metadata))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to append history entry", e))?;

        Ok(())
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    fn subscriptions(&mut self) -> &mut dyn SubscriptionRepository {
        self
    }

    fn history(&mut self) -> &mut dyn HistoryRepository {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| db_error("Failed to roll back transaction", e))
    }
}
