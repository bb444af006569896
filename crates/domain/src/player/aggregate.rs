//! Player aggregate implementation.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;

use crate::aggregate::Aggregate;
use crate::error::Inconsistency;
use crate::validation::{
    ValidationContext, ValidationOutcome, Validator, identity_matches, not_in_future, required,
};

use super::{
    DiscoverRecipe, InitializePlayer, PlayerCommand, PlayerEvent, RecipeId,
    events::{PlayerInitializedData, RecipeDiscoveredData},
};

static INITIALIZE_RULES: LazyLock<Validator<InitializePlayer, Player>> = LazyLock::new(|| {
    Validator::new()
        .rule("identity", identity_matches)
        .rule(
            "display_name",
            required("display_name", |c: &InitializePlayer| c.display_name.as_str()),
        )
        .rule("joined_at", not_in_future("joined_at", |c: &InitializePlayer| c.joined_at))
        .rule("not_initialized", |_, player: &Player, _| {
            if player.is_initialized() {
                Err("player is already initialized".to_string())
            } else {
                Ok(())
            }
        })
});

static DISCOVER_RULES: LazyLock<Validator<DiscoverRecipe, Player>> = LazyLock::new(|| {
    Validator::new()
        .rule("identity", identity_matches)
        .rule("recipe_id", required("recipe_id", |c: &DiscoverRecipe| c.recipe_id.as_str()))
        .rule("discovered_at", not_in_future("discovered_at", |c: &DiscoverRecipe| c.discovered_at))
        .rule("initialized", |_, player: &Player, _| {
            if player.is_initialized() {
                Ok(())
            } else {
                Err("player is not initialized".to_string())
            }
        })
        .rule("after_joining", |cmd: &DiscoverRecipe, player: &Player, _| match player.joined_at {
            Some(joined_at) if cmd.discovered_at < joined_at => Err(format!(
                "discovered_at {} precedes joined_at {joined_at}",
                cmd.discovered_at
            )),
            _ => Ok(()),
        })
});

/// Read model returned by the player statistics query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStatistics {
    pub display_name: String,
    pub discoveries: usize,
    pub known_recipes: BTreeSet<RecipeId>,
    pub first_discovery_at: Option<DateTime<Utc>>,
    pub last_discovery_at: Option<DateTime<Utc>>,
}

/// Player aggregate root.
///
/// Tracks a player's profile and the set of recipes they have discovered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Player {
    id: Option<AggregateId>,
    version: Version,
    display_name: String,
    joined_at: Option<DateTime<Utc>>,
    known_recipes: BTreeSet<RecipeId>,
    first_discovery_at: Option<DateTime<Utc>>,
    last_discovery_at: Option<DateTime<Utc>>,
}

impl Player {
    pub fn is_initialized(&self) -> bool {
        self.id.is_some()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn joined_at(&self) -> Option<DateTime<Utc>> {
        self.joined_at
    }

    pub fn knows(&self, recipe_id: &RecipeId) -> bool {
        self.known_recipes.contains(recipe_id)
    }

    pub fn known_recipes(&self) -> &BTreeSet<RecipeId> {
        &self.known_recipes
    }

    /// Returns `None` before the player is initialized.
    pub fn statistics(&self) -> Option<PlayerStatistics> {
        self.is_initialized().then(|| PlayerStatistics {
            display_name: self.display_name.clone(),
            discoveries: self.known_recipes.len(),
            known_recipes: self.known_recipes.clone(),
            first_discovery_at: self.first_discovery_at,
            last_discovery_at: self.last_discovery_at,
        })
    }

    fn initialize(
        &self,
        cmd: &InitializePlayer,
        ctx: &ValidationContext,
    ) -> ValidationOutcome<PlayerEvent> {
        if let Err(rejection) = INITIALIZE_RULES.validate(cmd, self, ctx) {
            return rejection.into();
        }

        ValidationOutcome::accept(PlayerEvent::PlayerInitialized(PlayerInitializedData {
            player_id: cmd.player_id,
            display_name: cmd.display_name.trim().to_string(),
            joined_at: cmd.joined_at,
        }))
    }

    fn discover(
        &self,
        cmd: &DiscoverRecipe,
        ctx: &ValidationContext,
    ) -> ValidationOutcome<PlayerEvent> {
        if let Err(rejection) = DISCOVER_RULES.validate(cmd, self, ctx) {
            return rejection.into();
        }

        if self.knows(&cmd.recipe_id) {
            return ValidationOutcome::no_op();
        }

        ValidationOutcome::accept(PlayerEvent::RecipeDiscovered(RecipeDiscoveredData {
            player_id: cmd.player_id,
            recipe_id: cmd.recipe_id.clone(),
            discovered_at: cmd.discovered_at,
        }))
    }

    fn apply_initialized(&mut self, data: PlayerInitializedData) -> Result<(), Inconsistency> {
        if self.is_initialized() {
            return Err(Inconsistency::new(
                "Player",
                "PlayerInitialized",
                "player is already initialized",
            ));
        }

        self.id = Some(data.player_id);
        self.display_name = data.display_name;
        self.joined_at = Some(data.joined_at);
        Ok(())
    }

    fn apply_discovered(&mut self, data: RecipeDiscoveredData) -> Result<(), Inconsistency> {
        if !self.is_initialized() {
            return Err(Inconsistency::new(
                "Player",
                "RecipeDiscovered",
                "player is not initialized",
            ));
        }
        if self.knows(&data.recipe_id) {
            return Err(Inconsistency::new(
                "Player",
                "RecipeDiscovered",
                format!("recipe {} is already known", data.recipe_id),
            ));
        }

        self.known_recipes.insert(data.recipe_id);
        self.first_discovery_at.get_or_insert(data.discovered_at);
        self.last_discovery_at = Some(data.discovered_at);
        Ok(())
    }
}

impl Aggregate for Player {
    type Command = PlayerCommand;
    type Event = PlayerEvent;

    fn aggregate_type() -> &'static str {
        "Player"
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
        command: &PlayerCommand,
        ctx: &ValidationContext,
    ) -> ValidationOutcome<PlayerEvent> {
        match command {
            PlayerCommand::Initialize(cmd) => self.initialize(cmd, ctx),
            PlayerCommand::Discover(cmd) => self.discover(cmd, ctx),
        }
    }

    fn apply(&mut self, event: PlayerEvent) -> Result<(), Inconsistency> {
        match event {
            PlayerEvent::PlayerInitialized(data) => self.apply_initialized(data),
            PlayerEvent::RecipeDiscovered(data) => self.apply_discovered(data),
        }
    }
}
