//! Achievement commands.

use chrono::{DateTime, Utc};
use common::AggregateId;

use crate::command::Command;

use super::AchievementId;

/// Command to unlock an achievement for a player.
#[derive(Debug, Clone)]
pub struct UnlockAchievement {
    pub player_id: AggregateId,
    pub achievement_id: AchievementId,
    pub unlocked_at: DateTime<Utc>,
}

impl UnlockAchievement {
    pub fn new(
        player_id: AggregateId,
        achievement_id: impl Into<AchievementId>,
        unlocked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            player_id,
            achievement_id: achievement_id.into(),
            unlocked_at,
        }
    }
}

impl Command for UnlockAchievement {
    /// The player's achievement ledger, not the player itself.
    fn aggregate_id(&self) -> AggregateId {
        super::ledger_id(self.player_id)
    }

    fn command_type(&self) -> &'static str {
        "UnlockAchievement"
    }
}
