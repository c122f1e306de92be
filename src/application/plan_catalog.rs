//! PlanCatalog - read access to plan templates plus the activation toggle.

use std::sync::Arc;

use crate::domain::foundation::{ErrorCode, PlanId};
use crate::domain::subscription::{Plan, SubscriptionError};
use crate::ports::PlanRepository;

/// Lookup of plan templates used to validate assignments.
#[derive(Clone)]
pub struct PlanCatalog {
    plans: Arc<dyn PlanRepository>,
}

impl PlanCatalog {
    pub fn new(plans: Arc<dyn PlanRepository>) -> Self {
        Self { plans }
    }

    /// Returns the plan, active or not.
    pub async fn get_by_id(&self, id: &PlanId) -> Result<Plan, SubscriptionError> {
        self.plans
            .find_by_id(id)
            .await?
            .ok_or_else(|| SubscriptionError::plan_not_found(*id))
    }

    /// Returns true if the plan accepts new assignments.
    pub fn is_active(&self, plan: &Plan) -> bool {
        plan.is_active
    }

    /// Returns the plan if it exists and accepts new assignments.
    ///
    /// Inactive plans are reported as `PlanNotFound`.
    pub async fn get_assignable(&self, id: &PlanId) -> Result<Plan, SubscriptionError> {
        let plan = self.get_by_id(id).await?;
        if !self.is_active(&plan) {
            tracing::debug!(plan_id = %id, "plan is inactive");
            return Err(SubscriptionError::plan_not_found(*id));
        }
        Ok(plan)
    }

    pub async fn list_active(&self) -> Result<Vec<Plan>, SubscriptionError> {
        Ok(self.plans.list_active().await?)
    }

    /// Toggles whether the plan accepts new assignments.
    ///
    /// Existing subscriptions on the plan are not touched.
    pub async fn set_active(&self, id: &PlanId, is_active: bool) -> Result<Plan, SubscriptionError> {
        let plan = self.plans.set_active(id, is_active).await.map_err(|e| {
            if e.code == ErrorCode::PlanNotFound {
                SubscriptionError::plan_not_found(*id)
            } else {
                SubscriptionError::from(e)
            }
        })?;
        tracing::info!(plan_id = %id, is_active, "plan activation changed");
        Ok(plan)
    }
}
