//! Rule engine error types.

use thiserror::Error;

/// Errors that stop the engine from processing a delivery.
///
/// Failures of follow-up unlock commands are not errors; they are logged and
/// counted where they happen.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Tallying the discovery failed.
    #[error("Domain error: {0}")]
    Domain(#[from] domain::DomainError),

    /// The delivered payload is not a player event.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

/// Result type for rule engine operations.
pub type Result<T> = std::result::Result<T, RuleError>;
