//! Subscription status state machine.
//!
//! A subscription starts `Active` and ends either `Canceled` (user action or
//! replacement by a new assignment) or `Expired` (sweeper). Both end states
//! are terminal; closed periods stay in storage for audit.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of one subscription period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// The user currently holds the plan.
    Active,

    /// Closed before its expiry instant.
    Canceled,

    /// Closed by the sweeper once its expiry instant passed.
    Expired,
}

impl SubscriptionStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Returns true while the subscription counts toward the one-active-per-user invariant.
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "canceled" | "cancelled" => Ok(SubscriptionStatus::Canceled),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(format!("Invalid subscription status: {}", other)),
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!((self, target), (Active, Canceled) | (Active, Expired))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Active => vec![Canceled, Expired],
            Canceled | Expired => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SubscriptionStatus; 3] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Canceled,
        SubscriptionStatus::Expired,
    ];

    #[test]
    fn active_can_be_canceled() {
        assert_eq!(
            SubscriptionStatus::Active.transition_to(SubscriptionStatus::Canceled),
            Ok(SubscriptionStatus::Canceled)
        );
    }

    #[test]
    fn active_can_expire() {
        assert_eq!(
            SubscriptionStatus::Active.transition_to(SubscriptionStatus::Expired),
            Ok(SubscriptionStatus::Expired)
        );
    }

    #[test]
    fn closed_states_are_terminal() {
        assert!(SubscriptionStatus::Canceled.is_terminal());
        assert!(SubscriptionStatus::Expired.is_terminal());
        assert!(!SubscriptionStatus::Active.is_terminal());
    }

    #[test]
    fn no_transition_leaves_a_closed_state() {
        for from in [SubscriptionStatus::Canceled, SubscriptionStatus::Expired] {
            for to in ALL {
                assert!(from.transition_to(to).is_err(), "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn active_does_not_transition_to_itself() {
        assert!(!SubscriptionStatus::Active.can_transition_to(&SubscriptionStatus::Active));
    }

    #[test]
    fn parses_storage_values() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>(), Ok(status));
        }
        assert_eq!(
            "cancelled".parse::<SubscriptionStatus>(),
            Ok(SubscriptionStatus::Canceled)
        );
        assert!("paused".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::Canceled).unwrap();
        assert_eq!(json, "\"canceled\"");
    }
}
