//! HTTP handlers for plan and subscription endpoints.
//!
//! These handlers connect Axum routes to the ledger, the plan catalog and
//! the expiration sweeper.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::{ExpirationSweeper, PlanCatalog, SubscriptionLedger};
use crate::domain::foundation::{DomainError, ValidationError};
use crate::domain::subscription::SubscriptionError;
use crate::ports::Clock;

use super::dto::{
    parse_instant, parse_plan_id, parse_user_id, AssignPlanRequest, ErrorResponse, ExpiringQuery,
    HistoryEntryResponse, PlanResponse, RenewPlanRequest, SetPlanActivationRequest,
    SubscriptionResponse, SweepQuery, SweepResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state, cloned for each request.
#[derive(Clone)]
pub struct SubscriptionAppState {
    pub ledger: Arc<SubscriptionLedger>,
    pub sweeper: Arc<ExpirationSweeper>,
    pub clock: Arc<dyn Clock>,
}

impl SubscriptionAppState {
    pub fn catalog(&self) -> &PlanCatalog {
        self.ledger.catalog()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Plan Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/plans - List plans open for assignment
pub async fn list_plans(
    State(state): State<SubscriptionAppState>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let plans = state.catalog().list_active().await?;
    let response: Vec<PlanResponse> = plans.into_iter().map(PlanResponse::from).collect();
    Ok(Json(response))
}

/// GET /api/plans/:plan_id - Get a plan, active or not
pub async fn get_plan(
    State(state): State<SubscriptionAppState>,
    Path(plan_id): Path<String>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let plan_id = parse_plan_id(&plan_id)?;
    let plan = state.catalog().get_by_id(&plan_id).await?;
    Ok(Json(PlanResponse::from(plan)))
}

/// PUT /api/plans/:plan_id/activation - Open or close a plan for assignment
pub async fn set_plan_activation(
    State(state): State<SubscriptionAppState>,
    Path(plan_id): Path<String>,
    Json(request): Json<SetPlanActivationRequest>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let plan_id = parse_plan_id(&plan_id)?;
    let plan = state
        .catalog()
        .set_active(&plan_id, request.is_active)
        .await?;
    Ok(Json(PlanResponse::from(plan)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscription Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/users/:user_id/plan - Assign a plan
pub async fn assign_plan(
    State(state): State<SubscriptionAppState>,
    Path(user_id): Path<String>,
    Json(request): Json<AssignPlanRequest>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let user_id = parse_user_id(&user_id)?;
    let plan_id = parse_plan_id(&request.plan_id)?;

    let subscription = state.ledger.assign(&user_id, &plan_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from(subscription)),
    ))
}

/// GET /api/users/:user_id/plan - Get the active subscription
pub async fn get_active_plan(
    State(state): State<SubscriptionAppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let user_id = parse_user_id(&user_id)?;
    let subscription = state.ledger.get_active(&user_id).await?;
    Ok(Json(SubscriptionResponse::from(subscription)))
}

/// PUT /api/users/:user_id/plan/renewal - Move the expiry of the active subscription
pub async fn renew_plan(
    State(state): State<SubscriptionAppState>,
    Path(user_id): Path<String>,
    Json(request): Json<RenewPlanRequest>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let user_id = parse_user_id(&user_id)?;
    let new_expiry = parse_instant("expires_at", &request.expires_at)?;

    let subscription = state.ledger.renew(&user_id, new_expiry).await?;

    Ok(Json(SubscriptionResponse::from(subscription)))
}

/// DELETE /api/users/:user_id/plan - Cancel the active subscription
pub async fn cancel_plan(
    State(state): State<SubscriptionAppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let user_id = parse_user_id(&user_id)?;
    state.ledger.cancel(&user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/users/:user_id/plan/history - Plan history, newest first
pub async fn get_plan_history(
    State(state): State<SubscriptionAppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let user_id = parse_user_id(&user_id)?;
    let entries = state.ledger.get_history(&user_id).await?;
    let response: Vec<HistoryEntryResponse> =
        entries.into_iter().map(HistoryEntryResponse::from).collect();
    Ok(Json(response))
}

/// GET /api/users/:user_id/subscriptions - Every subscription period, newest first
pub async fn list_user_subscriptions(
    State(state): State<SubscriptionAppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let user_id = parse_user_id(&user_id)?;
    let subscriptions = state.ledger.list_subscriptions(&user_id).await?;
    let response: Vec<SubscriptionResponse> = subscriptions
        .into_iter()
        .map(SubscriptionResponse::from)
        .collect();
    Ok(Json(response))
}

// ════════════════════════════════════════════════════════════════════════════════
// Expiry Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/subscriptions/expiring?days=N - Active subscriptions ending soon
pub async fn list_expiring(
    State(state): State<SubscriptionAppState>,
    Query(query): Query<ExpiringQuery>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let days = query
        .days
        .unwrap_or(state.sweeper.config().default_expiring_days);
    let subscriptions = state.sweeper.list_expiring_within(days).await?;
    let response: Vec<SubscriptionResponse> = subscriptions
        .into_iter()
        .map(SubscriptionResponse::from)
        .collect();
    Ok(Json(response))
}

/// POST /api/admin/sweeps?at=RFC3339 - Run one expiration sweep
pub async fn trigger_sweep(
    State(state): State<SubscriptionAppState>,
    Query(query): Query<SweepQuery>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let now = match query.at.as_deref() {
        Some(raw) => parse_instant("at", raw)?,
        None => state.clock.now(),
    };

    let report = state.sweeper.sweep(now).await?;
    tracing::info!(
        expired = report.expired,
        skipped = report.skipped,
        failed = report.failed,
        "sweep triggered over HTTP"
    );

    Ok(Json(SweepResponse::from(report)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts ledger errors to HTTP responses.
#[derive(Debug)]
pub struct SubscriptionApiError(SubscriptionError);

impl From<SubscriptionError> for SubscriptionApiError {
    fn from(err: SubscriptionError) -> Self {
        Self(err)
    }
}

impl From<DomainError> for SubscriptionApiError {
    fn from(err: DomainError) -> Self {
        Self(SubscriptionError::from(err))
    }
}

impl From<ValidationError> for SubscriptionApiError {
    fn from(err: ValidationError) -> Self {
        Self(SubscriptionError::from(err))
    }
}

impl IntoResponse for SubscriptionApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            SubscriptionError::PlanNotFound(_) | SubscriptionError::NoActiveSubscription(_) => {
                StatusCode::NOT_FOUND
            }
            SubscriptionError::ConcurrentModification(_) => StatusCode::CONFLICT,
            SubscriptionError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            SubscriptionError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let error = ErrorResponse::new(self.0.code().to_string(), self.0.to_string());
        (status, Json(error)).into_response()
    }
}
