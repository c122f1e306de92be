//! Append-only audit records of subscription transitions.

use crate::domain::foundation::{HistoryEntryId, PlanId, SubscriptionId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::Subscription;

/// Opaque key/value annotations attached to a history entry.
pub type HistoryMetadata = BTreeMap<String, String>;

/// Kind of transition a history entry documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Assign,
    Renew,
    Cancel,
    Expire,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Assign => "assign",
            HistoryAction::Renew => "renew",
            HistoryAction::Cancel => "cancel",
            HistoryAction::Expire => "expire",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assign" => Ok(HistoryAction::Assign),
            "renew" => Ok(HistoryAction::Renew),
            "cancel" => Ok(HistoryAction::Cancel),
            "expire" => Ok(HistoryAction::Expire),
            other => Err(format!("Invalid history action: {}", other)),
        }
    }
}

/// Immutable record of one subscription transition.
///
/// Plan references follow the transition's direction: an assignment has no
/// old plan unless it replaced one, closing transitions have no new plan,
/// and a renewal references the same plan on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub subscription_id: SubscriptionId,
    pub action: HistoryAction,
    pub old_plan_id: Option<PlanId>,
    pub new_plan_id: Option<PlanId>,
    pub changed_at: Timestamp,
    #[serde(default)]
    pub metadata: HistoryMetadata,
}

impl HistoryEntry {
    fn new(
        subscription: &Subscription,
        action: HistoryAction,
        old_plan_id: Option<PlanId>,
        new_plan_id: Option<PlanId>,
        changed_at: Timestamp,
    ) -> Self {
        Self {
            id: HistoryEntryId::new(),
            subscription_id: subscription.id,
            action,
            old_plan_id,
            new_plan_id,
            changed_at,
            metadata: HistoryMetadata::new(),
        }
    }

    /// A new subscription was created.
    pub fn assigned(subscription: &Subscription, changed_at: Timestamp) -> Self {
        Self::new(
            subscription,
            HistoryAction::Assign,
            None,
            Some(subscription.plan_id),
            changed_at,
        )
    }

    /// A new subscription replaced `previous` in the same unit of work.
    pub fn replaced(
        subscription: &Subscription,
        previous: &Subscription,
        changed_at: Timestamp,
    ) -> Self {
        Self::new(
            subscription,
            HistoryAction::Assign,
            Some(previous.plan_id),
            Some(subscription.plan_id),
            changed_at,
        )
        .with_metadata("replaced_subscription_id", previous.id.to_string())
    }

    /// The expiry of an active subscription moved.
    pub fn renewed(
        subscription: &Subscription,
        previous_expires_at: Timestamp,
        changed_at: Timestamp,
    ) -> Self {
        Self::new(
            subscription,
            HistoryAction::Renew,
            Some(subscription.plan_id),
            Some(subscription.plan_id),
            changed_at,
        )
        .with_metadata("previous_expires_at", previous_expires_at.to_string())
        .with_metadata("expires_at", subscription.expires_at.to_string())
    }

    /// The subscription was closed before its expiry.
    pub fn canceled(subscription: &Subscription, changed_at: Timestamp) -> Self {
        Self::new(
            subscription,
            HistoryAction::Cancel,
            Some(subscription.plan_id),
            None,
            changed_at,
        )
    }

    /// The sweeper closed the subscription after its expiry instant.
    pub fn expired(subscription: &Subscription, changed_at: Timestamp) -> Self {
        Self::new(
            subscription,
            HistoryAction::Expire,
            Some(subscription.plan_id),
            None,
            changed_at,
        )
        .with_metadata("reason", "expired")
        .with_metadata("expires_at", subscription.expires_at.to_string())
    }

    /// Adds a metadata annotation.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
