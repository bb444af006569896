//! Domain error types.

use channel::ChannelError;
use common::AggregateId;
use event_store::{EventStoreError, Version};
use thiserror::Error;

/// An event that cannot be applied to the current state.
///
/// Never expected on the command path, since commands are validated first.
/// During replay it means the log contradicts the aggregate's rules and the
/// instance cannot be trusted.
#[derive(Debug, Clone, Error)]
#[error("{aggregate_type} cannot apply {event_type}: {reason}")]
pub struct Inconsistency {
    pub aggregate_type: &'static str,
    pub event_type: &'static str,
    pub reason: String,
}

impl Inconsistency {
    pub fn new(
        aggregate_type: &'static str,
        event_type: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            aggregate_type,
            event_type,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during domain operations.
///
/// Command rejections are not errors; they come back as
/// [`ValidationOutcome::Rejected`](crate::ValidationOutcome::Rejected).
#[derive(Debug, Error)]
pub enum DomainError {
    /// The event log failed; nothing was applied or published.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// The event was persisted and applied but could not be published.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// State and event disagree.
    #[error("Inconsistency: {0}")]
    Inconsistency(#[from] Inconsistency),

    /// A stored event could not be decoded.
    #[error("Undecodable {event_type} at version {version} of {aggregate_id}: {source}")]
    Undecodable {
        aggregate_id: AggregateId,
        event_type: String,
        version: Version,
        #[source]
        source: serde_json::Error,
    },

    /// The hosting actor stopped after an inconsistency and refuses further work.
    #[error("Aggregate {aggregate_id} halted: {reason}")]
    Halted {
        aggregate_id: AggregateId,
        reason: String,
    },

    /// The hosting actor could not load its state.
    #[error("Aggregate {aggregate_id} failed to activate: {reason}")]
    Activation {
        aggregate_id: AggregateId,
        reason: String,
    },

    /// The hosting actor went away before answering.
    #[error("Actor for {aggregate_id} is gone")]
    ActorGone { aggregate_id: AggregateId },

    /// A query ran before the aggregate's first accepted command.
    #[error("{aggregate_type} {aggregate_id} is not initialized")]
    NotInitialized {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Whether the hosting actor must stop serving this aggregate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Inconsistency(_) | Self::Undecodable { .. } | Self::Halted { .. }
        )
    }
}
