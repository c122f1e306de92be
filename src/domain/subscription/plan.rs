//! Plan template.

use crate::domain::foundation::{PlanId, ValidationError};
use serde::{Deserialize, Serialize};

/// A subscription template users can be assigned to.
///
/// Plans are immutable once a live subscription references them; the only
/// permitted mutation is toggling `is_active`, which stops new assignments
/// without touching existing subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub duration_days: u32,
    pub is_active: bool,
}

impl Plan {
    /// Upper bound for a single assignment period (ten years).
    pub const MAX_DURATION_DAYS: u32 = 3650;

    /// Creates a new active plan.
    pub fn new(
        id: PlanId,
        name: impl Into<String>,
        duration_days: u32,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        if duration_days == 0 || duration_days > Self::MAX_DURATION_DAYS {
            return Err(ValidationError::out_of_range(
                "duration_days",
                1,
                i64::from(Self::MAX_DURATION_DAYS),
                i64::from(duration_days),
            ));
        }
        Ok(Self {
            id,
            name: name.trim().to_string(),
            duration_days,
            is_active: true,
        })
    }

    /// Returns a copy with the activation flag set.
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}
