//! Domain errors for the Meridian automation engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the Meridian system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Execution {0} already finalized")]
    AlreadyFinalized(Uuid),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Engine is not running")]
    EngineNotRunning,
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
