//! Achievement domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Topic carrying unlocked achievements.
pub const ACHIEVEMENTS_TOPIC: &str = "player-achievements";

/// Identifier of an achievement, e.g. `first-discovery`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AchievementId(String);

impl AchievementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AchievementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AchievementId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AchievementEvent {
    AchievementUnlocked(AchievementUnlockedData),
}

impl DomainEvent for AchievementEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AchievementEvent::AchievementUnlocked(_) => "AchievementUnlocked",
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            AchievementEvent::AchievementUnlocked(data) => super::ledger_id(data.player_id),
        }
    }

    fn topic(&self) -> &'static str {
        ACHIEVEMENTS_TOPIC
    }
}

/// Data for AchievementUnlocked event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementUnlockedData {
    pub player_id: AggregateId,
    pub achievement_id: AchievementId,
    pub unlocked_at: DateTime<Utc>,
}
