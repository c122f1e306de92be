//! PostgreSQL implementation of PlanRepository.

use async_trait::async_trait;
use sqlx::PgPool;

use super::rows::{db_error, PlanRow};
use crate::domain::foundation::{DomainError, ErrorCode, PlanId};
use crate::domain::subscription::Plan;
use crate::ports::PlanRepository;

/// PostgreSQL implementation of the PlanRepository port.
pub struct PostgresPlanRepository {
    pool: PgPool,
}

impl PostgresPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanRepository for PostgresPlanRepository {
    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        let row: Option<PlanRow> = sqlx::query_as(
            r#"
            SELECT id, name, duration_days, is_active
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find plan", e))?;

        row.map(Plan::try_from).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Plan>, DomainError> {
        let rows: Vec<PlanRow> = sqlx::query_as(
            r#"
            SELECT id, name, duration_days, is_active
            FROM plans
            WHERE is_active
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list plans", e))?;

        rows.into_iter().map(Plan::try_from).collect()
    }

    async fn set_active(&self, id: &PlanId, is_active: bool) -> Result<Plan, DomainError> {
        let row: Option<PlanRow> = sqlx::query_as(
            r#"
            UPDATE plans SET is_active = $2
            WHERE id = $1
            RETURNING id, name, duration_days, is_active
            "#,
        )
        .bind(id.as_uuid())
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update plan", e))?;

        row.map(Plan::try_from).transpose()?.ok_or_else(|| {
            DomainError::new(ErrorCode::PlanNotFound, format!("Plan not found: {}", id))
        })
    }
}
