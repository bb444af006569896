//! A small aggregate shared by the framework's unit tests.

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::command::Command;
use crate::error::Inconsistency;
use crate::validation::{ValidationContext, ValidationOutcome};
use common::AggregateId;
use event_store::{EventEnvelope, Version};

pub const TALLY_TOPIC: &str = "tallies";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TallyEvent {
    Opened { id: AggregateId },
    Bumped { id: AggregateId, by: u32 },
}

impl DomainEvent for TallyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TallyEvent::Opened { .. } => "TallyOpened",
            TallyEvent::Bumped { .. } => "TallyBumped",
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            TallyEvent::Opened { id } | TallyEvent::Bumped { id, .. } => *id,
        }
    }

    fn topic(&self) -> &'static str {
        TALLY_TOPIC
    }
}

#[derive(Debug)]
pub enum TallyCommand {
    Open(AggregateId),
    Bump(AggregateId, u32),
}

impl Command for TallyCommand {
    fn aggregate_id(&self) -> AggregateId {
        match self {
            TallyCommand::Open(id) | TallyCommand::Bump(id, _) => *id,
        }
    }

    fn command_type(&self) -> &'static str {
        match self {
            TallyCommand::Open(_) => "Open",
            TallyCommand::Bump(..) => "Bump",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tally {
    pub id: Option<AggregateId>,
    pub total: u32,
    pub version: Version,
}

impl Aggregate for Tally {
    type Command = TallyCommand;
    type Event = TallyEvent;

    fn aggregate_type() -> &'static str {
        "Tally"
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
        command: &TallyCommand,
        _: &ValidationContext,
    ) -> ValidationOutcome<TallyEvent> {
        match *command {
            TallyCommand::Open(id) if self.id.is_none() => {
                ValidationOutcome::accept(TallyEvent::Opened { id })
            }
            TallyCommand::Open(_) => ValidationOutcome::reject("already open"),
            TallyCommand::Bump(_, 0) => ValidationOutcome::no_op(),
            TallyCommand::Bump(id, by) => {
                if self.id.is_none() {
                    ValidationOutcome::reject("not open")
                } else {
                    ValidationOutcome::accept(TallyEvent::Bumped { id, by })
                }
            }
        }
    }

    fn apply(&mut self, event: TallyEvent) -> Result<(), Inconsistency> {
        match event {
            TallyEvent::Opened { id } => {
                if self.id.is_some() {
                    return Err(Inconsistency::new("Tally", "TallyOpened", "opened twice"));
                }
                self.id = Some(id);
            }
            TallyEvent::Bumped { by, .. } => {
                if self.id.is_none() {
                    return Err(Inconsistency::new("Tally", "TallyBumped", "not open"));
                }
                self.total += by;
            }
        }
        Ok(())
    }
}

/// An envelope that cannot be replayed onto an empty tally.
pub fn orphan_bump(id: AggregateId) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(id)
        .aggregate_type("Tally")
        .event_type("TallyBumped")
        .version(Version::first())
        .payload(&TallyEvent::Bumped { id, by: 1 })
        .unwrap()
        .build()
        .unwrap()
}
