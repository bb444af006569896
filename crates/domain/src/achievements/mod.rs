//! Per-player achievement ledger.
//!
//! Achievements are keyed by the player they belong to but live in their own
//! log, under an identity derived from the player's.

mod aggregate;
mod commands;
mod events;
mod service;

pub use aggregate::{Achievements, UnlockedAchievement};
pub use commands::UnlockAchievement;
pub use events::{ACHIEVEMENTS_TOPIC, AchievementEvent, AchievementId, AchievementUnlockedData};
pub use service::AchievementService;

use common::AggregateId;

const ACHIEVEMENTS_SCOPE: &str = "achievements";

/// The identity of a player's achievement ledger.
pub fn ledger_id(player_id: AggregateId) -> AggregateId {
    player_id.derive(ACHIEVEMENTS_SCOPE)
}
