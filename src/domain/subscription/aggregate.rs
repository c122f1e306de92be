//! Subscription aggregate.
//!
//! One `Subscription` is one period during which a user holds a plan. A new
//! assignment always creates a new row; closed rows are kept for audit.
//!
//! # Versioning
//!
//! `version` starts at 1 and every mutating method bumps it by one.
//! Repositories persist updates with a compare-and-swap against
//! `version - 1`, so two writers racing on the same row cannot both win.

use crate::domain::foundation::{
    DomainError, ErrorCode, PlanId, StateMachine, SubscriptionId, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use super::{Plan, SubscriptionStatus};

/// Subscription aggregate - one assignment period of a plan to a user.
///
/// # Invariants
///
/// - `start_date <= expires_at` at creation (renewals may move `expires_at` earlier)
/// - Status transitions follow [`SubscriptionStatus`] rules
/// - At most one `Active` subscription per `user_id` (enforced by the ledger and storage)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub start_date: Timestamp,
    pub expires_at: Timestamp,
    pub status: SubscriptionStatus,
    pub version: i64,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Starts a new active period of `plan` at `now`.
    ///
    /// The period ends exactly `plan.duration_days` days later.
    pub fn start(id: SubscriptionId, user_id: UserId, plan: &Plan, now: Timestamp) -> Self {
        Self {
            id,
            user_id,
            plan_id: plan.id,
            start_date: now,
            expires_at: now.add_days(i64::from(plan.duration_days)),
            status: SubscriptionStatus::Active,
            version: 1,
            updated_at: now,
        }
    }

    /// Returns true while this period is the user's active subscription.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Returns true if the sweeper should expire this subscription at `now`.
    pub fn is_due_for_expiry(&self, now: Timestamp) -> bool {
        self.is_active() && self.expires_at <= now
    }

    /// Returns true if this active subscription ends within `(now, until]`.
    pub fn is_expiring_between(&self, now: Timestamp, until: Timestamp) -> bool {
        self.is_active() && self.expires_at > now && self.expires_at <= until
    }

    /// Whole days left until expiry, zero once past.
    pub fn days_remaining(&self, now: Timestamp) -> i64 {
        self.expires_at.duration_since(&now).num_days().max(0)
    }

    /// Moves the expiry to the start of `new_expiry`'s UTC calendar day.
    ///
    /// No ordering check: an earlier date than the current expiry is accepted.
    /// Returns the previous expiry.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if the subscription is not active.
    pub fn renew(&mut self, new_expiry: Timestamp, now: Timestamp) -> Result<Timestamp, DomainError> {
        if !self.is_active() {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Cannot renew a {} subscription", self.status),
            ));
        }
        let previous = self.expires_at;
        self.expires_at = new_expiry.start_of_day();
        self.touch(now);
        Ok(previous)
    }

    /// Closes the period immediately: status canceled, expiry set to `now`.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if the subscription is already closed.
    pub fn cancel(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.transition(SubscriptionStatus::Canceled)?;
        self.expires_at = now;
        self.touch(now);
        Ok(())
    }

    /// Marks the period expired. The expiry instant is left untouched.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if the subscription is already closed.
    pub fn expire(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.transition(SubscriptionStatus::Expired)?;
        self.touch(now);
        Ok(())
    }

    fn transition(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|e| {
            DomainError::new(ErrorCode::InvalidStateTransition, e.to_string())
                .with_detail("subscription_id", self.id.to_string())
        })?;
        Ok(())
    }

    fn touch(&mut self, now: Timestamp) {
        self.version += 1;
        self.updated_at = now;
    }
}
