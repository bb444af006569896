//! Player aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod value_objects;

pub use aggregate::{Player, PlayerStatistics};
pub use commands::{DiscoverRecipe, InitializePlayer, PlayerCommand};
pub use events::{
    PLAYER_DISCOVERIES_TOPIC, PLAYER_LIFECYCLE_TOPIC, PlayerEvent, PlayerInitializedData,
    RecipeDiscoveredData,
};
pub use service::PlayerService;
pub use value_objects::RecipeId;
