//! Saga error types.

use channel::ChannelError;
use domain::DomainError;
use event_store::EventStoreError;
use thiserror::Error;
use timer::TimerError;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Event store error.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// The channel refused a publish or subscribe.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The reconcile reminder could not be scheduled or cancelled.
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;
