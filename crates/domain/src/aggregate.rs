//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

use crate::command::Command;
use crate::error::Inconsistency;
use crate::validation::{ValidationContext, ValidationOutcome};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent:
    Serialize + DeserializeOwned + Send + Sync + Clone + std::fmt::Debug + 'static
{
    /// Returns the event type name.
    ///
    /// This is used for serialization and event store filtering.
    fn event_type(&self) -> &'static str;

    /// The identity of the aggregate that produced the event.
    fn aggregate_id(&self) -> AggregateId;

    /// The channel topic the event is published on.
    fn topic(&self) -> &'static str;
}

/// Trait for aggregates in an event-sourced system.
///
/// In event sourcing, aggregates:
/// - Are rebuilt by replaying events from `Default`
/// - Validate commands and decide which event, if any, to emit
/// - Apply events to update state (pure, deterministic)
pub trait Aggregate: Default + Clone + Send + Sync + Sized + 'static {
    /// The commands this aggregate accepts.
    type Command: Command;

    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate type name.
    ///
    /// Used for event store organization and routing.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the current version of the aggregate.
    ///
    /// Version starts at 0 for a new aggregate and increments with each event.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    ///
    /// Called by the command handler after loading or appending events.
    fn set_version(&mut self, version: Version);

    /// Validates a command against current state and decides the outcome.
    ///
    /// Must not mutate anything; state changes only through [`apply`](Self::apply).
    fn handle(
        &self,
        command: &Self::Command,
        ctx: &ValidationContext,
    ) -> ValidationOutcome<Self::Event>;

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Pure and deterministic: every timestamp comes from the event. Fails
    /// when the event's preconditions do not hold for the current state.
    fn apply(&mut self, event: Self::Event) -> Result<(), Inconsistency>;

    /// Applies multiple events in sequence, stopping at the first failure.
    fn apply_events(
        &mut self,
        events: impl IntoIterator<Item = Self::Event>,
    ) -> Result<(), Inconsistency> {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Opened { id: AggregateId },
        Added { id: AggregateId, by: i32 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "CounterOpened",
                CounterEvent::Added { .. } => "CounterAdded",
            }
        }

        fn aggregate_id(&self) -> AggregateId {
            match self {
                CounterEvent::Opened { id } | CounterEvent::Added { id, .. } => *id,
            }
        }

        fn topic(&self) -> &'static str {
            "counters"
        }
    }

    #[derive(Debug)]
    struct Add {
        id: AggregateId,
        by: i32,
    }

    impl Command for Add {
        fn aggregate_id(&self) -> AggregateId {
            self.id
        }

        fn command_type(&self) -> &'static str {
            "Add"
        }
    }

    #[derive(Debug, Default, Clone)]
    struct Counter {
        id: Option<AggregateId>,
        value: i32,
        version: Version,
    }

    impl Aggregate for Counter {
        type Command = Add;
        type Event = CounterEvent;

        fn aggregate_type() -> &'static str {
            "Counter"
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

        fn handle(&self, command: &Add, _: &ValidationContext) -> ValidationOutcome<CounterEvent> {
            ValidationOutcome::accept(CounterEvent::Added {
                id: command.id,
                by: command.by,
            })
        }

        fn apply(&mut self, event: CounterEvent) -> Result<(), Inconsistency> {
            match event {
                CounterEvent::Opened { id } => {
                    if self.id.is_some() {
                        return Err(Inconsistency::new("Counter", "CounterOpened", "opened twice"));
                    }
                    self.id = Some(id);
                }
                CounterEvent::Added { by, .. } => {
                    if self.id.is_none() {
                        return Err(Inconsistency::new("Counter", "CounterAdded", "not opened"));
                    }
                    self.value += by;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn apply_events_folds_in_order() {
        let id = AggregateId::new();
        let mut counter = Counter::default();
        counter
            .apply_events(vec![
                CounterEvent::Opened { id },
                CounterEvent::Added { id, by: 40 },
                CounterEvent::Added { id, by: 2 },
            ])
            .unwrap();

        assert_eq!(counter.id(), Some(id));
        assert_eq!(counter.value, 42);
    }

    #[test]
    fn apply_events_stops_at_inconsistency() {
        let id = AggregateId::new();
        let mut counter = Counter::default();
        let err = counter
            .apply_events(vec![
                CounterEvent::Added { id, by: 1 },
                CounterEvent::Opened { id },
            ])
            .unwrap_err();

        assert_eq!(err.event_type, "CounterAdded");
        assert!(counter.id().is_none());
    }

    #[test]
    fn domain_event_routing() {
        let id = AggregateId::new();
        let event = CounterEvent::Added { id, by: 1 };
        assert_eq!(event.event_type(), "CounterAdded");
        assert_eq!(event.aggregate_id(), id);
        assert_eq!(event.topic(), "counters");
    }
}
