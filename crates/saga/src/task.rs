//! The save task, a child of a saga operation.
//!
//! A task completes once per operation and announces it on the
//! confirmations topic under its own id. Coordinators listen for that
//! announcement; nothing else tells them a child is done.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use channel::{Delivery, EnvelopeHandler, HandlerError, SubscriptionTable};
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::validation::identity_matches;
use domain::{
    Aggregate, AggregateHost, Command, CommandHandler, CommandResult, DomainError, DomainEvent,
    HostConfig, Inconsistency, ValidationContext, ValidationOutcome, Validator,
};
use event_store::{EventStore, Version};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::events::{CHILD_CONFIRMED_TOPIC, CHILD_REQUESTED_TOPIC, ChildRequested};

/// Completes a task on behalf of a saga operation.
#[derive(Debug, Clone, Copy)]
pub struct CompleteTask {
    pub task_id: AggregateId,
    pub saga_id: AggregateId,
    pub operation_id: AggregateId,
}

impl CompleteTask {
    pub fn new(task_id: AggregateId, saga_id: AggregateId, operation_id: AggregateId) -> Self {
        Self {
            task_id,
            saga_id,
            operation_id,
        }
    }
}

impl Command for CompleteTask {
    fn aggregate_id(&self) -> AggregateId {
        self.task_id
    }

    fn command_type(&self) -> &'static str {
        "CompleteTask"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    TaskCompleted(TaskCompletedData),
}

impl DomainEvent for TaskEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TaskEvent::TaskCompleted(_) => "TaskCompleted",
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            TaskEvent::TaskCompleted(data) => data.task_id,
        }
    }

    fn topic(&self) -> &'static str {
        CHILD_CONFIRMED_TOPIC
    }
}

/// Data for TaskCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletedData {
    pub task_id: AggregateId,
    pub saga_id: AggregateId,
    pub operation_id: AggregateId,
    pub completed_at: DateTime<Utc>,
}

static COMPLETE_RULES: LazyLock<Validator<CompleteTask, SaveTask>> = LazyLock::new(|| {
    Validator::new()
        .rule("identity", identity_matches)
        .rule("not_own_saga", |cmd: &CompleteTask, _, _| {
            if cmd.saga_id == cmd.task_id {
                Err("a task cannot coordinate itself".to_string())
            } else {
                Ok(())
            }
        })
});

/// Child aggregate that records which operations it has completed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveTask {
    id: Option<AggregateId>,
    version: Version,
    operations: BTreeSet<(AggregateId, AggregateId)>,
    last_completed_at: Option<DateTime<Utc>>,
}

impl SaveTask {
    pub fn has_completed(&self, saga_id: AggregateId, operation_id: AggregateId) -> bool {
        self.operations.contains(&(saga_id, operation_id))
    }

    pub fn completions(&self) -> usize {
        self.operations.len()
    }

    pub fn last_completed_at(&self) -> Option<DateTime<Utc>> {
        self.last_completed_at
    }
}

impl Aggregate for SaveTask {
    type Command = CompleteTask;
    type Event = TaskEvent;

    fn aggregate_type() -> &'static str {
        "SaveTask"
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

    fn handle(&self, cmd: &CompleteTask, ctx: &ValidationContext) -> ValidationOutcome<TaskEvent> {
        if let Err(rejection) = COMPLETE_RULES.validate(cmd, self, ctx) {
            return rejection.into();
        }
        if self.has_completed(cmd.saga_id, cmd.operation_id) {
            return ValidationOutcome::no_op();
        }

        ValidationOutcome::accept(TaskEvent::TaskCompleted(TaskCompletedData {
            task_id: cmd.task_id,
            saga_id: cmd.saga_id,
            operation_id: cmd.operation_id,
            completed_at: ctx.now,
        }))
    }

    fn apply(&mut self, event: TaskEvent) -> std::result::Result<(), Inconsistency> {
        let TaskEvent::TaskCompleted(data) = event;
        if !self.operations.insert((data.saga_id, data.operation_id)) {
            return Err(Inconsistency::new(
                "SaveTask",
                "TaskCompleted",
                format!("operation {} already completed", data.operation_id),
            ));
        }

        self.id.get_or_insert(data.task_id);
        self.last_completed_at = Some(data.completed_at);
        Ok(())
    }
}

/// Runs save tasks, and completes them when a coordinator asks.
pub struct TaskService<S: EventStore> {
    host: AggregateHost<S, SaveTask>,
}

impl<S: EventStore> Clone for TaskService<S> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
        }
    }
}

impl<S: EventStore + 'static> TaskService<S> {
    pub fn new(handler: CommandHandler<S, SaveTask>, config: HostConfig) -> Self {
        Self {
            host: AggregateHost::new(handler, config),
        }
    }

    pub fn host(&self) -> &AggregateHost<S, SaveTask> {
        &self.host
    }

    #[tracing::instrument(skip(self))]
    pub async fn complete_task(
        &self,
        cmd: CompleteTask,
    ) -> std::result::Result<CommandResult<SaveTask>, DomainError> {
        self.host.send(cmd.task_id, cmd).await
    }

    /// Fails before the task has completed anything.
    pub async fn task(&self, task_id: AggregateId) -> std::result::Result<SaveTask, DomainError> {
        let task = self.host.state(task_id).await?;
        if task.id().is_none() {
            return Err(DomainError::NotInitialized {
                aggregate_type: SaveTask::aggregate_type(),
                aggregate_id: task_id,
            });
        }
        Ok(task)
    }

    /// Registers the service as the worker for child requests.
    pub fn subscribe(self, table: SubscriptionTable) -> SubscriptionTable {
        table.register("save-tasks", CHILD_REQUESTED_TOPIC, Arc::new(self))
    }

    /// Completes the task named by a `ChildRequested` envelope.
    pub async fn process(&self, delivery: &Delivery) -> Result<()> {
        if delivery.envelope.event_type != ChildRequested::EVENT_TYPE {
            tracing::debug!(
                event_type = %delivery.envelope.event_type,
                "not a child request, skipped"
            );
            return Ok(());
        }

        let request: ChildRequested = delivery.envelope.decode()?;
        let result = self
            .complete_task(CompleteTask::new(
                request.child_id,
                request.saga_id,
                request.operation_id,
            ))
            .await?;

        if let Some(rejection) = result.outcome.rejection() {
            tracing::warn!(
                task_id = %request.child_id,
                saga_id = %request.saga_id,
                reasons = %rejection,
                "task request rejected"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl<S: EventStore + 'static> EnvelopeHandler for TaskService<S> {
    async fn handle(&self, delivery: Delivery) -> std::result::Result<(), HandlerError> {
        self.process(&delivery).await.map_err(HandlerError::new)
    }
}
