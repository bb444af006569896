//! Achievements aggregate implementation.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;

use crate::aggregate::Aggregate;
use crate::error::Inconsistency;
use crate::validation::{
    ValidationContext, ValidationOutcome, Validator, identity_matches, not_in_future, required,
};

use super::{AchievementEvent, AchievementId, AchievementUnlockedData, UnlockAchievement};

static UNLOCK_RULES: LazyLock<Validator<UnlockAchievement, Achievements>> = LazyLock::new(|| {
    Validator::new()
        .rule("identity", identity_matches)
        .rule(
            "achievement_id",
            required("achievement_id", |c: &UnlockAchievement| c.achievement_id.as_str()),
        )
        .rule("unlocked_at", not_in_future("unlocked_at", |c: &UnlockAchievement| c.unlocked_at))
        .rule("same_player", |cmd: &UnlockAchievement, ledger: &Achievements, _| {
            match ledger.player_id {
                Some(player_id) if player_id != cmd.player_id => {
                    Err(format!("ledger belongs to player {player_id}"))
                }
                _ => Ok(()),
            }
        })
        .rule("not_unlocked", |cmd: &UnlockAchievement, ledger: &Achievements, _| {
            if ledger.has(&cmd.achievement_id) {
                Err(format!("achievement {} is already unlocked", cmd.achievement_id))
            } else {
                Ok(())
            }
        })
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockedAchievement {
    pub achievement_id: AchievementId,
    pub unlocked_at: DateTime<Utc>,
}

/// The set of achievements one player has unlocked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Achievements {
    id: Option<AggregateId>,
    player_id: Option<AggregateId>,
    version: Version,
    unlocked: BTreeMap<AchievementId, DateTime<Utc>>,
}

impl Achievements {
    pub fn player_id(&self) -> Option<AggregateId> {
        self.player_id
    }

    pub fn has(&self, achievement_id: &AchievementId) -> bool {
        self.unlocked.contains_key(achievement_id)
    }

    /// Unlocked achievements in id order, or `None` before the first unlock.
    pub fn unlocked(&self) -> Option<Vec<UnlockedAchievement>> {
        self.id.map(|_| {
            self.unlocked
                .iter()
                .map(|(achievement_id, unlocked_at)| UnlockedAchievement {
                    achievement_id: achievement_id.clone(),
                    unlocked_at: *unlocked_at,
                })
                .collect()
        })
    }
}

impl Aggregate for Achievements {
    type Command = UnlockAchievement;
    type Event = AchievementEvent;

    fn aggregate_type() -> &'static str {
        "Achievements"
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
        command: &UnlockAchievement,
        ctx: &ValidationContext,
    ) -> ValidationOutcome<AchievementEvent> {
        if let Err(rejection) = UNLOCK_RULES.validate(command, self, ctx) {
            return rejection.into();
        }

        ValidationOutcome::accept(AchievementEvent::AchievementUnlocked(AchievementUnlockedData {
            player_id: command.player_id,
            achievement_id: command.achievement_id.clone(),
            unlocked_at: command.unlocked_at,
        }))
    }

    fn apply(&mut self, event: AchievementEvent) -> Result<(), Inconsistency> {
        match event {
            AchievementEvent::AchievementUnlocked(data) => {
                if self.player_id.is_some_and(|owner| owner != data.player_id) {
                    return Err(Inconsistency::new(
                        "Achievements",
                        "AchievementUnlocked",
                        format!("event for player {} in another player's ledger", data.player_id),
                    ));
                }
                if self.has(&data.achievement_id) {
                    return Err(Inconsistency::new(
                        "Achievements",
                        "AchievementUnlocked",
                        format!("achievement {} is already unlocked", data.achievement_id),
                    ));
                }

                self.id.get_or_insert(super::ledger_id(data.player_id));
                self.player_id = Some(data.player_id);
                self.unlocked.insert(data.achievement_id, data.unlocked_at);
                Ok(())
            }
        }
    }
}
