//! Plan repository port.
//!
//! Plans are read far more often than written. The only mutation the ledger
//! needs is the activation toggle; plan CRUD lives in an external catalog.

use crate::domain::foundation::{DomainError, PlanId};
use crate::domain::subscription::Plan;
use async_trait::async_trait;

/// Repository port for plan templates.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Find a plan by its ID, active or not.
    ///
    /// Returns `None` if not found.
    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, DomainError>;

    /// List plans that currently accept new assignments, ordered by name.
    async fn list_active(&self) -> Result<Vec<Plan>, DomainError>;

    /// Set the activation flag.
    ///
    /// # Errors
    ///
    /// - `PlanNotFound` if the plan doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn set_active(&self, id: &PlanId, is_active: bool) -> Result<Plan, DomainError>;
}
