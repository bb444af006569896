//! Per-player achievement progress.
//!
//! The engine's own memory of what it has already counted. Persisting the
//! processed source event ids is what makes redelivered discoveries harmless.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Timelike, Utc};
use common::AggregateId;
use domain::validation::{identity_matches, not_in_future, required};
use domain::{
    Aggregate, Command, DomainEvent, Inconsistency, RecipeId, ValidationContext,
    ValidationOutcome, Validator,
};
use event_store::{EventId, Version};
use serde::{Deserialize, Serialize};

/// Topic carrying tallied discoveries.
pub const PROGRESS_TOPIC: &str = "achievement-progress";

const PROGRESS_SCOPE: &str = "achievement-progress";

/// Discoveries made before this hour (UTC) count as early.
pub const EARLY_CUTOFF_HOUR: u32 = 6;

/// The identity of a player's progress record.
pub fn progress_id(player_id: AggregateId) -> AggregateId {
    player_id.derive(PROGRESS_SCOPE)
}

pub fn is_early(at: DateTime<Utc>) -> bool {
    at.hour() < EARLY_CUTOFF_HOUR
}

/// Command to count one `RecipeDiscovered` event towards a player's progress.
#[derive(Debug, Clone)]
pub struct RecordDiscovery {
    pub player_id: AggregateId,

    /// The event id of the discovery, used to recognise redelivery.
    pub source_event_id: EventId,
    pub recipe_id: RecipeId,
    pub discovered_at: DateTime<Utc>,
}

impl Command for RecordDiscovery {
    fn aggregate_id(&self) -> AggregateId {
        progress_id(self.player_id)
    }

    fn command_type(&self) -> &'static str {
        "RecordDiscovery"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProgressEvent {
    DiscoveryTallied(DiscoveryTalliedData),
}

impl DomainEvent for ProgressEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProgressEvent::DiscoveryTallied(_) => "DiscoveryTallied",
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            ProgressEvent::DiscoveryTallied(data) => progress_id(data.player_id),
        }
    }

    fn topic(&self) -> &'static str {
        PROGRESS_TOPIC
    }
}

/// Data for DiscoveryTallied event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryTalliedData {
    pub player_id: AggregateId,
    pub source_event_id: EventId,
    pub recipe_id: RecipeId,
    pub discovered_at: DateTime<Utc>,

    /// Discoveries counted so far, including this one.
    pub total: u32,
}

static RECORD_RULES: LazyLock<Validator<RecordDiscovery, AchievementProgress>> =
    LazyLock::new(|| {
        Validator::new()
            .rule("identity", identity_matches)
            .rule("recipe_id", required("recipe_id", |c: &RecordDiscovery| c.recipe_id.as_str()))
            .rule(
                "discovered_at",
                not_in_future("discovered_at", |c: &RecordDiscovery| c.discovered_at),
            )
    });

/// Running totals the achievement rules are evaluated against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AchievementProgress {
    id: Option<AggregateId>,
    player_id: Option<AggregateId>,
    version: Version,
    discoveries: u32,
    early_discoveries: u32,
    processed: BTreeSet<EventId>,
    known_recipes: BTreeSet<RecipeId>,
    last_discovery_at: Option<DateTime<Utc>>,
}

impl AchievementProgress {
    pub fn player_id(&self) -> Option<AggregateId> {
        self.player_id
    }

    pub fn discoveries(&self) -> u32 {
        self.discoveries
    }

    /// Discoveries made before [`EARLY_CUTOFF_HOUR`].
    pub fn early_discoveries(&self) -> u32 {
        self.early_discoveries
    }

    pub fn has_processed(&self, event_id: &EventId) -> bool {
        self.processed.contains(event_id)
    }

    pub fn last_discovery_at(&self) -> Option<DateTime<Utc>> {
        self.last_discovery_at
    }
}

impl Aggregate for AchievementProgress {
    type Command = RecordDiscovery;
    type Event = ProgressEvent;

    fn aggregate_type() -> &'static str {
        "AchievementProgress"
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
        command: &RecordDiscovery,
        ctx: &ValidationContext,
    ) -> ValidationOutcome<ProgressEvent> {
        if let Err(rejection) = RECORD_RULES.validate(command, self, ctx) {
            return rejection.into();
        }

        // Redelivered, or a recipe that was already counted under another event.
        if self.has_processed(&command.source_event_id)
            || self.known_recipes.contains(&command.recipe_id)
        {
            return ValidationOutcome::no_op();
        }

        ValidationOutcome::accept(ProgressEvent::DiscoveryTallied(DiscoveryTalliedData {
            player_id: command.player_id,
            source_event_id: command.source_event_id,
            recipe_id: command.recipe_id.clone(),
            discovered_at: command.discovered_at,
            total: self.discoveries + 1,
        }))
    }

    fn apply(&mut self, event: ProgressEvent) -> Result<(), Inconsistency> {
        let ProgressEvent::DiscoveryTallied(data) = event;

        if self.has_processed(&data.source_event_id) {
            return Err(Inconsistency::new(
                "AchievementProgress",
                "DiscoveryTallied",
                format!("event {} already counted", data.source_event_id),
            ));
        }
        if data.total != self.discoveries + 1 {
            return Err(Inconsistency::new(
                "AchievementProgress",
                "DiscoveryTallied",
                format!("total {} does not follow {}", data.total, self.discoveries),
            ));
        }

        self.id.get_or_insert(progress_id(data.player_id));
        self.player_id = Some(data.player_id);
        self.discoveries = data.total;
        if is_early(data.discovered_at) {
            self.early_discoveries += 1;
        }
        self.processed.insert(data.source_event_id);
        self.known_recipes.insert(data.recipe_id);
        self.last_discovery_at = Some(data.discovered_at);
        Ok(())
    }
}
