//! Domain layer: event-sourced aggregates and the machinery that runs them.
//!
//! - [`Aggregate`] and [`DomainEvent`] describe an event-sourced entity
//! - [`Validator`] collects every reason a command is refused
//! - [`CommandHandler`] runs validate, append, apply and publish
//! - [`AggregateHost`] gives each aggregate identity its own actor
//! - [`player`] and [`achievements`] are the concrete aggregates

pub mod achievements;
pub mod aggregate;
pub mod command;
pub mod error;
pub mod host;
pub mod player;
pub mod validation;

#[cfg(test)]
mod testing;

pub use achievements::{
    AchievementEvent, AchievementId, AchievementService, Achievements, UnlockAchievement,
    UnlockedAchievement,
};
pub use aggregate::{Aggregate, DomainEvent};
pub use command::{Command, CommandHandler, CommandResult};
pub use error::{DomainError, Inconsistency};
pub use host::{ActorHooks, AggregateHost, HostConfig, NoHooks, WeakHost};
pub use player::{
    DiscoverRecipe, InitializePlayer, Player, PlayerCommand, PlayerEvent, PlayerService,
    PlayerStatistics, RecipeId,
};
pub use validation::{
    Clock, FixedClock, Rejection, SystemClock, ValidationContext, ValidationOutcome, Validator,
};
