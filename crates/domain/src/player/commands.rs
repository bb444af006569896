//! Player commands.

use chrono::{DateTime, Utc};
use common::AggregateId;

use crate::command::Command;

use super::RecipeId;

/// Command to create a player profile.
#[derive(Debug, Clone)]
pub struct InitializePlayer {
    pub player_id: AggregateId,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

impl InitializePlayer {
    pub fn new(
        player_id: AggregateId,
        display_name: impl Into<String>,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            player_id,
            display_name: display_name.into(),
            joined_at,
        }
    }
}

impl Command for InitializePlayer {
    fn aggregate_id(&self) -> AggregateId {
        self.player_id
    }

    fn command_type(&self) -> &'static str {
        "InitializePlayer"
    }
}

/// Command to record that a player discovered a recipe.
#[derive(Debug, Clone)]
pub struct DiscoverRecipe {
    pub player_id: AggregateId,
    pub recipe_id: RecipeId,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoverRecipe {
    pub fn new(
        player_id: AggregateId,
        recipe_id: impl Into<RecipeId>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            player_id,
            recipe_id: recipe_id.into(),
            discovered_at,
        }
    }
}

impl Command for DiscoverRecipe {
    fn aggregate_id(&self) -> AggregateId {
        self.player_id
    }

    fn command_type(&self) -> &'static str {
        "DiscoverRecipe"
    }
}

/// Every command a player accepts.
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    Initialize(InitializePlayer),
    Discover(DiscoverRecipe),
}

impl Command for PlayerCommand {
    fn aggregate_id(&self) -> AggregateId {
        match self {
            PlayerCommand::Initialize(cmd) => cmd.aggregate_id(),
            PlayerCommand::Discover(cmd) => cmd.aggregate_id(),
        }
    }

    fn command_type(&self) -> &'static str {
        match self {
            PlayerCommand::Initialize(cmd) => cmd.command_type(),
            PlayerCommand::Discover(cmd) => cmd.command_type(),
        }
    }
}

impl From<InitializePlayer> for PlayerCommand {
    fn from(cmd: InitializePlayer) -> Self {
        PlayerCommand::Initialize(cmd)
    }
}

impl From<DiscoverRecipe> for PlayerCommand {
    fn from(cmd: DiscoverRecipe) -> Self {
        PlayerCommand::Discover(cmd)
    }
}
