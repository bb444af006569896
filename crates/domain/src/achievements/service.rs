//! Achievement service.

use common::AggregateId;
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::{Command, CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::host::{AggregateHost, HostConfig};

use super::{Achievements, UnlockAchievement, UnlockedAchievement, ledger_id};

/// Service for unlocking and listing a player's achievements.
pub struct AchievementService<S: EventStore> {
    host: AggregateHost<S, Achievements>,
}

impl<S: EventStore> Clone for AchievementService<S> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
        }
    }
}

impl<S: EventStore + 'static> AchievementService<S> {
    pub fn new(handler: CommandHandler<S, Achievements>, config: HostConfig) -> Self {
        Self {
            host: AggregateHost::new(handler, config),
        }
    }

    pub fn host(&self) -> &AggregateHost<S, Achievements> {
        &self.host
    }

    #[tracing::instrument(skip(self))]
    pub async fn unlock_achievement(
        &self,
        cmd: UnlockAchievement,
    ) -> Result<CommandResult<Achievements>, DomainError> {
        self.host.send(cmd.aggregate_id(), cmd).await
    }

    /// Lists a player's achievements. Fails before the first unlock.
    #[tracing::instrument(skip(self))]
    pub async fn unlocked(
        &self,
        player_id: AggregateId,
    ) -> Result<Vec<UnlockedAchievement>, DomainError> {
        let ledger_id = ledger_id(player_id);
        self.host
            .state(ledger_id)
            .await?
            .unlocked()
            .ok_or(DomainError::NotInitialized {
                aggregate_type: Achievements::aggregate_type(),
                aggregate_id: ledger_id,
            })
    }
}
