//! Player domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::RecipeId;

/// Topic carrying player lifecycle events.
pub const PLAYER_LIFECYCLE_TOPIC: &str = "player-lifecycle";

/// Topic carrying recipe discoveries. Achievement rules listen here.
pub const PLAYER_DISCOVERIES_TOPIC: &str = "player-discoveries";

/// Events that can occur on a player aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PlayerEvent {
    /// Player profile was created.
    PlayerInitialized(PlayerInitializedData),

    /// Player discovered a recipe for the first time.
    RecipeDiscovered(RecipeDiscoveredData),
}

impl DomainEvent for PlayerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::PlayerInitialized(_) => "PlayerInitialized",
            PlayerEvent::RecipeDiscovered(_) => "RecipeDiscovered",
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            PlayerEvent::PlayerInitialized(data) => data.player_id,
            PlayerEvent::RecipeDiscovered(data) => data.player_id,
        }
    }

    fn topic(&self) -> &'static str {
        match self {
            PlayerEvent::PlayerInitialized(_) => PLAYER_LIFECYCLE_TOPIC,
            PlayerEvent::RecipeDiscovered(_) => PLAYER_DISCOVERIES_TOPIC,
        }
    }
}

/// Data for PlayerInitialized event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInitializedData {
    pub player_id: AggregateId,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

/// Data for RecipeDiscovered event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDiscoveredData {
    pub player_id: AggregateId,
    pub recipe_id: RecipeId,

    /// When the player made the discovery, as reported by the caller.
    pub discovered_at: DateTime<Utc>,
}
