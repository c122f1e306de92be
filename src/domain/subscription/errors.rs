//! Subscription-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | PlanNotFound | 404 |
//! | NoActiveSubscription | 404 |
//! | ConcurrentModification | 409 |
//! | ValidationFailed | 400 |
//! | PersistenceFailure | 500 |

use crate::domain::foundation::{DomainError, ErrorCode, PlanId, UserId, ValidationError};
use thiserror::Error;

/// Errors surfaced by the ledger, sweeper and plan catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// Plan is unknown or no longer accepts assignments.
    #[error("Plan not found: {0}")]
    PlanNotFound(PlanId),

    /// The user holds no active subscription.
    #[error("No active subscription for user: {0}")]
    NoActiveSubscription(UserId),

    /// Another writer changed the same rows first.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Input rejected before reaching storage.
    #[error("Validation failed for '{field}': {message}")]
    ValidationFailed { field: String, message: String },

    /// Storage failed or the operation deadline passed.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl SubscriptionError {
    pub fn plan_not_found(id: PlanId) -> Self {
        SubscriptionError::PlanNotFound(id)
    }

    pub fn no_active_subscription(user_id: UserId) -> Self {
        SubscriptionError::NoActiveSubscription(user_id)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        SubscriptionError::ConcurrentModification(message.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        SubscriptionError::PersistenceFailure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::PlanNotFound(_) => ErrorCode::PlanNotFound,
            SubscriptionError::NoActiveSubscription(_) => ErrorCode::NoActiveSubscription,
            SubscriptionError::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            SubscriptionError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::PersistenceFailure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns true if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubscriptionError::ConcurrentModification(_))
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ConcurrentModification | ErrorCode::InvalidStateTransition => {
                SubscriptionError::ConcurrentModification(err.message)
            }
            ErrorCode::ValidationFailed => SubscriptionError::ValidationFailed {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            ErrorCode::PlanNotFound
            | ErrorCode::SubscriptionNotFound
            | ErrorCode::NoActiveSubscription
            | ErrorCode::DatabaseError
            | ErrorCode::Timeout
            | ErrorCode::InternalError => SubscriptionError::PersistenceFailure(err.to_string()),
        }
    }
}

impl From<ValidationError> for SubscriptionError {
    fn from(err: ValidationError) -> Self {
        DomainError::from(err).into()
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
