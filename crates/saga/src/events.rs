//! Saga domain events and the messages a coordinator exchanges with children.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::DomainEvent;
use serde::{Deserialize, Serialize};

/// Topic carrying coordinator lifecycle events.
pub const SAGA_TOPIC: &str = "saga-coordinators";

/// Topic on which coordinators ask children to do their work, keyed by child id.
pub const CHILD_REQUESTED_TOPIC: &str = "save-task-requests";

/// Topic on which children announce completion, keyed by their own id.
pub const CHILD_CONFIRMED_TOPIC: &str = "save-task-confirmations";

/// Events that can occur on a saga coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// An operation was accepted and its children requested.
    OperationPending(OperationPendingData),

    /// One child confirmed its work.
    ChildCompleted(ChildCompletedData),

    /// A reconcile tick found nothing left pending.
    OperationCompleted(OperationCompletedData),
}

impl DomainEvent for SagaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::OperationPending(_) => "OperationPending",
            SagaEvent::ChildCompleted(_) => "ChildCompleted",
            SagaEvent::OperationCompleted(_) => "OperationCompleted",
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            SagaEvent::OperationPending(data) => data.saga_id,
            SagaEvent::ChildCompleted(data) => data.saga_id,
            SagaEvent::OperationCompleted(data) => data.saga_id,
        }
    }

    fn topic(&self) -> &'static str {
        SAGA_TOPIC
    }
}

/// Data for OperationPending event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPendingData {
    pub saga_id: AggregateId,
    pub operation_id: AggregateId,
    pub child_ids: BTreeSet<AggregateId>,
    pub requested_at: DateTime<Utc>,
}

/// Data for ChildCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildCompletedData {
    pub saga_id: AggregateId,
    pub child_id: AggregateId,
    pub completed_at: DateTime<Utc>,
}

/// Data for OperationCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCompletedData {
    pub saga_id: AggregateId,
    pub operation_id: AggregateId,
    pub children: usize,
    pub completed_at: DateTime<Utc>,
}

/// Request for one child to do its part of an operation.
///
/// Published, never stored: the coordinator's `OperationPending` event is the
/// durable record that the request was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRequested {
    pub saga_id: AggregateId,
    pub operation_id: AggregateId,
    pub child_id: AggregateId,
}

impl ChildRequested {
    pub const EVENT_TYPE: &'static str = "ChildRequested";
}
