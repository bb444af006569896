//! The saga coordinator aggregate.
//!
//! A coordinator runs one operation: it fans the operation out to a set of
//! children, records each child's confirmation, and declares the operation
//! complete on the first reconcile tick that finds nothing pending.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::validation::identity_matches;
use domain::{Aggregate, Inconsistency, ValidationContext, ValidationOutcome, Validator};
use event_store::Version;

use crate::commands::{ConfirmChild, Reconcile, SagaCommand, SaveOperation};
use crate::events::{ChildCompletedData, OperationCompletedData, OperationPendingData, SagaEvent};
use crate::state::{SagaState, SagaStatus};

static SAVE_RULES: LazyLock<Validator<SaveOperation, SagaCoordinator>> = LazyLock::new(|| {
    Validator::new()
        .rule("identity", identity_matches)
        .rule("idle", |_, saga: &SagaCoordinator, _| {
            if saga.status == SagaStatus::Active {
                Err("an operation is already pending".to_string())
            } else {
                Ok(())
            }
        })
        .rule("children", |cmd: &SaveOperation, _, _| {
            if cmd.child_ids.is_empty() {
                Err("child_ids must not be empty".to_string())
            } else {
                Ok(())
            }
        })
        .rule("distinct_children", |cmd: &SaveOperation, _, _| {
            if cmd.distinct_children().len() == cmd.child_ids.len() {
                Ok(())
            } else {
                Err("child_ids contains duplicates".to_string())
            }
        })
});

static CONFIRM_RULES: LazyLock<Validator<ConfirmChild, SagaCoordinator>> = LazyLock::new(|| {
    Validator::new()
        .rule("identity", identity_matches)
        .rule("active", |_, saga: &SagaCoordinator, _| {
            if saga.status == SagaStatus::Idle {
                Err("no operation is pending".to_string())
            } else {
                Ok(())
            }
        })
        .rule("pending", |cmd: &ConfirmChild, saga: &SagaCoordinator, _| {
            if saga.status == SagaStatus::Idle || saga.pending.contains(&cmd.child_id) {
                Ok(())
            } else if saga.completed.contains(&cmd.child_id) {
                Err(format!("child {} is already completed", cmd.child_id))
            } else {
                Err(format!("child {} is not part of the operation", cmd.child_id))
            }
        })
});

static RECONCILE_RULES: LazyLock<Validator<Reconcile, SagaCoordinator>> =
    LazyLock::new(|| Validator::new().rule("identity", identity_matches));

/// Coordinator of a single fan-out/fan-in operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SagaCoordinator {
    id: Option<AggregateId>,
    version: Version,
    status: SagaStatus,
    operation_id: Option<AggregateId>,
    pending: BTreeSet<AggregateId>,
    completed: BTreeSet<AggregateId>,
    requested_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl SagaCoordinator {
    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// True once an operation has been requested, including after completion.
    pub fn is_active(&self) -> bool {
        self.status != SagaStatus::Idle
    }

    pub fn is_completed(&self) -> bool {
        self.status == SagaStatus::Completed
    }

    pub fn pending_operation_id(&self) -> Option<AggregateId> {
        self.operation_id
    }

    pub fn pending_child_ids(&self) -> &BTreeSet<AggregateId> {
        &self.pending
    }

    pub fn completed_child_ids(&self) -> &BTreeSet<AggregateId> {
        &self.completed
    }

    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.requested_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn state(&self) -> SagaState {
        SagaState {
            pending_operation_id: self.operation_id,
            pending_child_ids: self.pending.clone(),
            completed_child_ids: self.completed.clone(),
            is_active: self.is_active(),
            is_completed: self.is_completed(),
        }
    }

    fn save(&self, cmd: &SaveOperation, ctx: &ValidationContext) -> ValidationOutcome<SagaEvent> {
        if let Err(rejection) = SAVE_RULES.validate(cmd, self, ctx) {
            return rejection.into();
        }
        if self.is_completed() {
            tracing::info!(saga_id = %cmd.saga_id, "saga already completed, save ignored");
            return ValidationOutcome::no_op();
        }

        ValidationOutcome::accept(SagaEvent::OperationPending(OperationPendingData {
            saga_id: cmd.saga_id,
            operation_id: cmd.operation_id,
            child_ids: cmd.distinct_children(),
            requested_at: ctx.now,
        }))
    }

    fn confirm(&self, cmd: &ConfirmChild, ctx: &ValidationContext) -> ValidationOutcome<SagaEvent> {
        if self.is_completed() && cmd.saga_id == ctx.aggregate_id {
            tracing::info!(
                saga_id = %cmd.saga_id,
                child_id = %cmd.child_id,
                "saga already completed, confirmation ignored"
            );
            return ValidationOutcome::no_op();
        }
        if let Err(rejection) = CONFIRM_RULES.validate(cmd, self, ctx) {
            return rejection.into();
        }

        ValidationOutcome::accept(SagaEvent::ChildCompleted(ChildCompletedData {
            saga_id: cmd.saga_id,
            child_id: cmd.child_id,
            completed_at: ctx.now,
        }))
    }

    fn reconcile(&self, cmd: &Reconcile, ctx: &ValidationContext) -> ValidationOutcome<SagaEvent> {
        if let Err(rejection) = RECONCILE_RULES.validate(cmd, self, ctx) {
            return rejection.into();
        }

        match (self.status, self.operation_id) {
            (SagaStatus::Active, Some(operation_id)) if self.pending.is_empty() => {
                ValidationOutcome::accept(SagaEvent::OperationCompleted(OperationCompletedData {
                    saga_id: cmd.saga_id,
                    operation_id,
                    children: self.completed.len(),
                    completed_at: ctx.now,
                }))
            }
            (SagaStatus::Active, _) => {
                tracing::debug!(
                    saga_id = %cmd.saga_id,
                    pending = self.pending.len(),
                    "children still pending"
                );
                ValidationOutcome::no_op()
            }
            (SagaStatus::Completed, _) => {
                tracing::info!(saga_id = %cmd.saga_id, "saga already completed, tick ignored");
                ValidationOutcome::no_op()
            }
            (SagaStatus::Idle, _) => ValidationOutcome::no_op(),
        }
    }

    fn apply_pending(&mut self, data: OperationPendingData) -> Result<(), Inconsistency> {
        if self.status != SagaStatus::Idle {
            return Err(Inconsistency::new(
                "SagaCoordinator",
                "OperationPending",
                format!("saga is {}", self.status),
            ));
        }
        if data.child_ids.is_empty() {
            return Err(Inconsistency::new(
                "SagaCoordinator",
                "OperationPending",
                "operation has no children",
            ));
        }

        self.id = Some(data.saga_id);
        self.status = SagaStatus::Active;
        self.operation_id = Some(data.operation_id);
        self.pending = data.child_ids;
        self.requested_at = Some(data.requested_at);
        Ok(())
    }

    fn apply_child_completed(&mut self, data: ChildCompletedData) -> Result<(), Inconsistency> {
        if self.status != SagaStatus::Active {
            return Err(Inconsistency::new(
                "SagaCoordinator",
                "ChildCompleted",
                format!("saga is {}", self.status),
            ));
        }
        if !self.pending.remove(&data.child_id) {
            return Err(Inconsistency::new(
                "SagaCoordinator",
                "ChildCompleted",
                format!("child {} is not pending", data.child_id),
            ));
        }

        self.completed.insert(data.child_id);
        Ok(())
    }

    fn apply_operation_completed(
        &mut self,
        data: OperationCompletedData,
    ) -> Result<(), Inconsistency> {
        if self.status != SagaStatus::Active {
            return Err(Inconsistency::new(
                "SagaCoordinator",
                "OperationCompleted",
                format!("saga is {}", self.status),
            ));
        }
        if !self.pending.is_empty() {
            return Err(Inconsistency::new(
                "SagaCoordinator",
                "OperationCompleted",
                format!("{} children still pending", self.pending.len()),
            ));
        }
        if self.operation_id != Some(data.operation_id) {
            return Err(Inconsistency::new(
                "SagaCoordinator",
                "OperationCompleted",
                format!("operation {} is not the pending one", data.operation_id),
            ));
        }

        self.status = SagaStatus::Completed;
        self.completed_at = Some(data.completed_at);
        Ok(())
    }
}

impl Aggregate for SagaCoordinator {
    type Command = SagaCommand;
    type Event = SagaEvent;

    fn aggregate_type() -> &'static str {
        "SagaCoordinator"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn handle(
        &self,
        command: &SagaCommand,
        ctx: &ValidationContext,
    ) -> ValidationOutcome<SagaEvent> {
        match command {
            SagaCommand::SaveOperation(cmd) => self.save(cmd, ctx),
            SagaCommand::ConfirmChild(cmd) => self.confirm(cmd, ctx),
            SagaCommand::Reconcile(cmd) => self.reconcile(cmd, ctx),
        }
    }

    fn apply(&mut self, event: SagaEvent) -> Result<(), Inconsistency> {
        match event {
            SagaEvent::OperationPending(data) => self.apply_pending(data)?,
            SagaEvent::ChildCompleted(data) => self.apply_child_completed(data)?,
            SagaEvent::OperationCompleted(data) => self.apply_operation_completed(data)?,
        }
        debug_assert!(self.state().check_invariants().is_ok());
        Ok(())
    }
}
