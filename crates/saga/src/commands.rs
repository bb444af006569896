//! Saga coordinator commands.

use std::collections::BTreeSet;

use common::AggregateId;
use domain::Command;

/// Starts an operation that fans out to `child_ids`.
#[derive(Debug, Clone)]
pub struct SaveOperation {
    pub saga_id: AggregateId,
    pub operation_id: AggregateId,

    /// Kept as a list so duplicates can be detected and rejected.
    pub child_ids: Vec<AggregateId>,
}

impl SaveOperation {
    pub fn new(
        saga_id: AggregateId,
        operation_id: AggregateId,
        child_ids: impl IntoIterator<Item = AggregateId>,
    ) -> Self {
        Self {
            saga_id,
            operation_id,
            child_ids: child_ids.into_iter().collect(),
        }
    }

    pub fn distinct_children(&self) -> BTreeSet<AggregateId> {
        self.child_ids.iter().copied().collect()
    }
}

/// Marks one child as done. Sent when the child's own confirmation arrives.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmChild {
    pub saga_id: AggregateId,
    pub child_id: AggregateId,
}

impl ConfirmChild {
    pub fn new(saga_id: AggregateId, child_id: AggregateId) -> Self {
        Self { saga_id, child_id }
    }
}

/// Periodic check: completes the operation once nothing is pending.
#[derive(Debug, Clone, Copy)]
pub struct Reconcile {
    pub saga_id: AggregateId,
}

impl Reconcile {
    pub fn new(saga_id: AggregateId) -> Self {
        Self { saga_id }
    }
}

/// Every command a saga coordinator accepts.
#[derive(Debug, Clone)]
pub enum SagaCommand {
    SaveOperation(SaveOperation),
    ConfirmChild(ConfirmChild),
    Reconcile(Reconcile),
}

impl Command for SaveOperation {
    fn aggregate_id(&self) -> AggregateId {
        self.saga_id
    }

    fn command_type(&self) -> &'static str {
        "SaveOperation"
    }
}

impl Command for ConfirmChild {
    fn aggregate_id(&self) -> AggregateId {
        self.saga_id
    }

    fn command_type(&self) -> &'static str {
        "ConfirmChild"
    }
}

impl Command for Reconcile {
    fn aggregate_id(&self) -> AggregateId {
        self.saga_id
    }

    fn command_type(&self) -> &'static str {
        "Reconcile"
    }
}

impl Command for SagaCommand {
    fn aggregate_id(&self) -> AggregateId {
        match self {
            SagaCommand::SaveOperation(cmd) => cmd.aggregate_id(),
            SagaCommand::ConfirmChild(cmd) => cmd.aggregate_id(),
            SagaCommand::Reconcile(cmd) => cmd.aggregate_id(),
        }
    }

    fn command_type(&self) -> &'static str {
        match self {
            SagaCommand::SaveOperation(cmd) => cmd.command_type(),
            SagaCommand::ConfirmChild(cmd) => cmd.command_type(),
            SagaCommand::Reconcile(cmd) => cmd.command_type(),
        }
    }
}

impl From<SaveOperation> for SagaCommand {
    fn from(cmd: SaveOperation) -> Self {
        SagaCommand::SaveOperation(cmd)
    }
}

impl From<ConfirmChild> for SagaCommand {
    fn from(cmd: ConfirmChild) -> Self {
        SagaCommand::ConfirmChild(cmd)
    }
}

impl From<Reconcile> for SagaCommand {
    fn from(cmd: Reconcile) -> Self {
        SagaCommand::Reconcile(cmd)
    }
}
