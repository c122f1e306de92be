//! HTTP DTOs (Data Transfer Objects) for plan and subscription endpoints.
//!
//! These types define the JSON request/response structure of the API and
//! the parsing of raw path and body values into domain types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::application::SweepReport;
use crate::domain::foundation::{PlanId, Timestamp, UserId, ValidationError};
use crate::domain::subscription::{
    HistoryAction, HistoryEntry, HistoryMetadata, Plan, Subscription, SubscriptionStatus,
};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to assign a plan to a user.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignPlanRequest {
    pub plan_id: String,
}

/// Request to move the expiry of the active subscription.
///
/// Accepts an RFC 3339 instant or a bare `YYYY-MM-DD` date; either way the
/// ledger keeps only the UTC calendar day.
#[derive(Debug, Clone, Deserialize)]
pub struct RenewPlanRequest {
    pub expires_at: String,
}

/// Request to toggle whether a plan accepts new assignments.
#[derive(Debug, Clone, Deserialize)]
pub struct SetPlanActivationRequest {
    pub is_active: bool,
}

/// Query string of the expiring-subscriptions listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpiringQuery {
    #[serde(default)]
    pub days: Option<u32>,
}

/// Query string of the sweep trigger.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SweepQuery {
    #[serde(default)]
    pub at: Option<String>,
}

pub fn parse_user_id(raw: &str) -> Result<UserId, ValidationError> {
    UserId::new(raw)
}

pub fn parse_plan_id(raw: &str) -> Result<PlanId, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|_| ValidationError::invalid_format("plan_id", "expected a UUID"))
}

/// Parses an RFC 3339 instant or a `YYYY-MM-DD` date (taken as UTC midnight).
pub fn parse_instant(field: &str, raw: &str) -> Result<Timestamp, ValidationError> {
    let raw = raw.trim();
    if let Ok(ts) = Timestamp::parse_rfc3339(raw) {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| Timestamp::from_datetime(date.and_time(chrono::NaiveTime::MIN).and_utc()))
        .map_err(|_| ValidationError::invalid_format(field, "expected RFC 3339 or YYYY-MM-DD"))
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    pub id: String,
    pub name: String,
    pub duration_days: u32,
    pub is_active: bool,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id.to_string(),
            name: plan.name,
            duration_days: plan.duration_days,
            is_active: plan.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    /// ISO 8601.
    pub start_date: String,
    /// ISO 8601.
    pub expires_at: String,
    pub status: SubscriptionStatus,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id.to_string(),
            user_id: sub.user_id.to_string(),
            plan_id: sub.plan_id.to_string(),
            start_date: sub.start_date.to_string(),
            expires_at: sub.expires_at.to_string(),
            status: sub.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntryResponse {
    pub id: String,
    pub subscription_id: String,
    pub action: HistoryAction,
    pub old_plan_id: Option<String>,
    pub new_plan_id: Option<String>,
    pub changed_at: String,
    pub metadata: HistoryMetadata,
}

impl From<HistoryEntry> for HistoryEntryResponse {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            subscription_id: entry.subscription_id.to_string(),
            action: entry.action,
            old_plan_id: entry.old_plan_id.map(|id| id.to_string()),
            new_plan_id: entry.new_plan_id.map(|id| id.to_string()),
            changed_at: entry.changed_at.to_string(),
            metadata: entry.metadata,
        }
    }
}

/// Result of a triggered sweep. `count` is the number of subscriptions expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub count: u64,
    pub skipped: u64,
    pub failed: u64,
    pub batches: u32,
    pub interrupted: bool,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            count: report.expired,
            skipped: report.skipped,
            failed: report.failed,
            batches: report.batches,
            interrupted: report.interrupted,
        }
    }
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn parse_instant_accepts_rfc3339() {
        let ts = parse_instant("expires_at", "2024-06-15T17:30:00Z").unwrap();
        assert_eq!(
            ts,
            Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 6, 15, 17, 30, 0).unwrap())
        );
    }

    #[test]
    fn parse_instant_accepts_bare_date() {
        let ts = parse_instant("expires_at", "2024-06-15").unwrap();
        assert_eq!(
            ts,
            Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn parse_instant_rejects_garbage() {
        assert!(matches!(
            parse_instant("expires_at", "next tuesday"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn parse_plan_id_requires_uuid() {
        assert!(parse_plan_id("not-a-uuid").is_err());
        let id = PlanId::new();
        assert_eq!(parse_plan_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn sweep_response_reports_expired_as_count() {
        let report = SweepReport {
            expired: 4,
            skipped: 1,
            ..SweepReport::default()
        };
        let response = SweepResponse::from(report);
        assert_eq!(response.count, 4);
        assert_eq!(response.skipped, 1);
    }
}
