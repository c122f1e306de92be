//! PostgreSQL implementation of SubscriptionReader.
//!
//! Plain pool queries without row locks.

use async_trait::async_trait;
use sqlx::PgPool;

use super::rows::{db_error, HistoryRow, SubscriptionRow, HISTORY_COLUMNS, SUBSCRIPTION_COLUMNS};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::subscription::{HistoryEntry, Subscription};
use crate::ports::{ExpiryCursor, SubscriptionReader};

/// PostgreSQL implementation of the SubscriptionReader port.
pub struct PostgresSubscriptionReader {
    pool: PgPool,
}

impl PostgresSubscriptionReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionReader for PostgresSubscriptionReader {
    async fn find_active(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1 AND status = 'active'",
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find active subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn history_for_user(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>, DomainError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM plan_history h
            JOIN subscriptions s ON s.id = h.subscription_id
            WHERE s.user_id = $1
            ORDER BY h.changed_at DESC, h.seq DESC
            "#,
            HISTORY_COLUMNS
        );
        let rows: Vec<HistoryRow> = sqlx::query_as(&sql)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load plan history", e))?;

        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1 ORDER BY start_date DESC, updated_at DESC",
            SUBSCRIPTION_COLUMNS
        );
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list subscriptions", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn list_due_for_expiry(
        &self,
        now: Timestamp,
        after: Option<&ExpiryCursor>,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM subscriptions
            WHERE status = 'active'
              AND expires_at <= $1
              AND ($2::timestamptz IS NULL OR (expires_at, id) > ($2, $3))
            ORDER BY expires_at ASC, id ASC
            LIMIT $4
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(now.as_datetime())
            .bind(after.map(|c| *c.expires_at.as_datetime()))
            .bind(after.map(|c| *c.id.as_uuid()))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list subscriptions due for expiry", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn list_expiring_between(
        &self,
        from: Timestamp,
        until: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM subscriptions
            WHERE status = 'active'
              AND expires_at > $1
              AND expires_at <= $2
            ORDER BY expires_at ASC, id ASC
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(from.as_datetime())
            .bind(until.as_datetime())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list expiring subscriptions", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}
