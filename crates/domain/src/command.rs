//! Command handling infrastructure.

use std::marker::PhantomData;
use std::sync::Arc;

use channel::EventChannel;
use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;
use crate::validation::{Clock, SystemClock, ValidationContext, ValidationOutcome};

/// Trait for commands that can be executed against an aggregate.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the aggregate's current state doesn't allow the action.
pub trait Command: Send + Sync + std::fmt::Debug + 'static {
    /// Returns the ID of the aggregate this command claims to target.
    fn aggregate_id(&self) -> AggregateId;

    /// Short name used in logs and metric labels.
    fn command_type(&self) -> &'static str;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate state after the command.
    pub aggregate: A,

    /// What the aggregate decided.
    pub outcome: ValidationOutcome<A::Event>,

    /// The persisted envelope, present only when an event was emitted.
    pub envelope: Option<EventEnvelope>,

    /// The version of the aggregate after the command.
    pub new_version: Version,
}

impl<A: Aggregate> CommandResult<A> {
    fn unchanged(aggregate: &A, outcome: ValidationOutcome<A::Event>) -> Self {
        Self {
            aggregate: aggregate.clone(),
            outcome,
            envelope: None,
            new_version: aggregate.version(),
        }
    }

    pub fn event(&self) -> Option<&A::Event> {
        self.outcome.event()
    }
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Loading the aggregate by replaying its log
/// 2. Asking the aggregate to validate the command and decide
/// 3. Appending the emitted event with an optimistic version check
/// 4. Applying it and publishing it, in that order
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    channel: Arc<dyn EventChannel>,
    clock: Arc<dyn Clock>,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    /// Creates a new command handler with the given event store and channel.
    pub fn new(store: S, channel: Arc<dyn EventChannel>) -> Self {
        Self {
            store,
            channel,
            clock: Arc::new(SystemClock),
            _phantom: PhantomData,
        }
    }

    /// Replaces the clock handed to validation rules.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn channel(&self) -> &Arc<dyn EventChannel> {
        &self.channel
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Rebuilds an aggregate by replaying its whole log from `Default`.
    ///
    /// An aggregate that has never emitted comes back as `Default`.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let envelopes = self.store.get_events_for_aggregate(aggregate_id).await?;

        let mut aggregate = A::default();
        for envelope in envelopes {
            let event: A::Event =
                envelope
                    .decode()
                    .map_err(|source| DomainError::Undecodable {
                        aggregate_id,
                        event_type: envelope.event_type.clone(),
                        version: envelope.version,
                        source,
                    })?;
            aggregate.apply(event)?;
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Handles a command against in-memory state.
    ///
    /// On acceptance with an event, the event is appended and then applied to
    /// `aggregate`. If the append fails, `aggregate` is left untouched.
    /// Publishing is a separate step, see [`publish`](Self::publish).
    pub async fn handle(
        &self,
        aggregate: &mut A,
        aggregate_id: AggregateId,
        command: &A::Command,
    ) -> Result<CommandResult<A>, DomainError> {
        let ctx = ValidationContext::new(aggregate_id, self.clock.now());
        let outcome = aggregate.handle(command, &ctx);

        let event = match &outcome {
            ValidationOutcome::Rejected(rejection) => {
                tracing::info!(
                    aggregate_type = A::aggregate_type(),
                    %aggregate_id,
                    command = command.command_type(),
                    reasons = %rejection,
                    "command rejected"
                );
                metrics::counter!(
                    "commands_rejected_total",
                    "aggregate_type" => A::aggregate_type(),
                    "command" => command.command_type()
                )
                .increment(1);
                return Ok(CommandResult::unchanged(aggregate, outcome));
            }
            ValidationOutcome::Accepted(None) => {
                tracing::debug!(
                    aggregate_type = A::aggregate_type(),
                    %aggregate_id,
                    command = command.command_type(),
                    "command accepted without change"
                );
                metrics::counter!(
                    "commands_accepted_total",
                    "aggregate_type" => A::aggregate_type(),
                    "command" => command.command_type()
                )
                .increment(1);
                return Ok(CommandResult::unchanged(aggregate, outcome));
            }
            ValidationOutcome::Accepted(Some(event)) => event.clone(),
        };

        let current_version = aggregate.version();
        let envelope = self.build_envelope(aggregate_id, current_version.next(), &event, ctx.now)?;

        let new_version = self
            .store
            .append(vec![envelope.clone()], AppendOptions::after(current_version))
            .await?;

        let mut next = aggregate.clone();
        next.apply(event)?;
        next.set_version(new_version);
        *aggregate = next;

        tracing::info!(
            aggregate_type = A::aggregate_type(),
            %aggregate_id,
            event_type = %envelope.event_type,
            version = %new_version,
            "event appended"
        );
        metrics::counter!(
            "commands_accepted_total",
            "aggregate_type" => A::aggregate_type(),
            "command" => command.command_type()
        )
        .increment(1);

        Ok(CommandResult {
            aggregate: aggregate.clone(),
            outcome,
            envelope: Some(envelope),
            new_version,
        })
    }

    /// Publishes the emitted event on its topic, keyed by the producing aggregate.
    pub async fn publish(&self, result: &CommandResult<A>) -> Result<(), DomainError> {
        let (Some(event), Some(envelope)) = (result.event(), &result.envelope) else {
            return Ok(());
        };

        let topic = event.topic();
        self.channel
            .publish(topic, envelope.aggregate_id, envelope.clone())
            .await
            .inspect_err(|e| {
                tracing::error!(
                    topic,
                    aggregate_id = %envelope.aggregate_id,
                    event_id = %envelope.event_id,
                    error = %e,
                    "publish failed after append"
                );
            })?;

        metrics::counter!("events_published_total", "topic" => topic).increment(1);
        Ok(())
    }

    /// Loads, handles and publishes in one go.
    ///
    /// Suitable when no actor owns the aggregate; concurrent callers are
    /// serialized by the optimistic append.
    pub async fn execute(
        &self,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<CommandResult<A>, DomainError> {
        let mut aggregate = self.load(aggregate_id).await?;
        let result = self.handle(&mut aggregate, aggregate_id, &command).await?;
        self.publish(&result).await?;
        Ok(result)
    }

    fn build_envelope(
        &self,
        aggregate_id: AggregateId,
        version: Version,
        event: &A::Event,
        at: DateTime<Utc>,
    ) -> Result<EventEnvelope, DomainError> {
        Ok(EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .timestamp(at)
            .payload(event)?
            .build()?)
    }
}
