//! Row types shared by the PostgreSQL adapters.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use crate::domain::foundation::{
    DomainError, ErrorCode, HistoryEntryId, PlanId, SubscriptionId, Timestamp, UserId,
};
use crate::domain::subscription::{
    HistoryAction, HistoryEntry, HistoryMetadata, Plan, Subscription, SubscriptionStatus,
};

/// Partial unique index allowing one active row per user.
pub(super) const ONE_ACTIVE_PER_USER: &str = "subscriptions_one_active_per_user";

pub(super) const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, plan_id, start_date, expires_at, status, version, updated_at";

pub(super) const HISTORY_COLUMNS: &str =
    "h.id, h.subscription_id, h.action, h.old_plan_id, h.new_plan_id, h.changed_at, h.metadata";

/// Maps a sqlx error to a domain error.
///
/// Unique violations of the one-active index and serialization failures
/// become `ConcurrentModification` so the ledger retries them.
pub(super) fn db_error(context: &str, err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some(ONE_ACTIVE_PER_USER) {
            return DomainError::conflict("User already has an active subscription");
        }
        if is_serialization_failure(db_err.code().as_deref()) {
            return DomainError::conflict(format!("{}: {}", context, db_err.message()));
        }
    }
    DomainError::database(format!("{}: {}", context, err))
}

fn is_serialization_failure(sqlstate: Option<&str>) -> bool {
    matches!(sqlstate, Some("40001") | Some("40P01"))
}

fn corrupt(field: &str, value: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", field, value),
    )
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct PlanRow {
    pub id: Uuid,
    pub name: String,
    pub duration_days: i32,
    pub is_active: bool,
}

impl TryFrom<PlanRow> for Plan {
    type Error = DomainError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let duration_days =
            u32::try_from(row.duration_days).map_err(|_| corrupt("duration_days", row.duration_days))?;
        Ok(Plan {
            id: PlanId::from_uuid(row.id),
            name: row.name,
            duration_days,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: String,
    pub plan_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = row.status.parse().map_err(|_| corrupt("status", &row.status))?;
        let user_id = UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?;
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id,
            plan_id: PlanId::from_uuid(row.plan_id),
            start_date: Timestamp::from_datetime(row.start_date),
            expires_at: Timestamp::from_datetime(row.expires_at),
            status,
            version: row.version,
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct HistoryRow {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub action: String,
    pub old_plan_id: Option<Uuid>,
    pub new_plan_id: Option<Uuid>,
    pub changed_at: DateTime<Utc>,
    pub metadata: Json<HistoryMetadata>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = DomainError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let action: HistoryAction = row.action.parse().map_err(|_| corrupt("action", &row.action))?;
        Ok(HistoryEntry {
            id: HistoryEntryId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            action,
            old_plan_id: row.old_plan_id.map(PlanId::from_uuid),
            new_plan_id: row.new_plan_id.map(PlanId::from_uuid),
            changed_at: Timestamp::from_datetime(row.changed_at),
            metadata: row.metadata.0,
        })
    }
}
