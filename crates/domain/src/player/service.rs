//! Player service providing a simplified API for player operations.

use common::AggregateId;
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::host::{AggregateHost, HostConfig};

use super::{DiscoverRecipe, InitializePlayer, Player, PlayerStatistics};

/// Service for managing players.
///
/// Every call is routed through the player's actor, so commands for one
/// player are handled one at a time.
pub struct PlayerService<S: EventStore> {
    host: AggregateHost<S, Player>,
}

impl<S: EventStore> Clone for PlayerService<S> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
        }
    }
}

impl<S: EventStore + 'static> PlayerService<S> {
    pub fn new(handler: CommandHandler<S, Player>, config: HostConfig) -> Self {
        Self {
            host: AggregateHost::new(handler, config),
        }
    }

    /// Returns a reference to the underlying actor host.
    pub fn host(&self) -> &AggregateHost<S, Player> {
        &self.host
    }

    /// Creates a player profile. A second call for the same player is rejected.
    #[tracing::instrument(skip(self))]
    pub async fn initialize_player(
        &self,
        cmd: InitializePlayer,
    ) -> Result<CommandResult<Player>, DomainError> {
        self.host.send(cmd.player_id, cmd.into()).await
    }

    /// Records a discovery. Rediscovering a known recipe is a successful no-op.
    #[tracing::instrument(skip(self))]
    pub async fn discover_recipe(
        &self,
        cmd: DiscoverRecipe,
    ) -> Result<CommandResult<Player>, DomainError> {
        self.host.send(cmd.player_id, cmd.into()).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn statistics(
        &self,
        player_id: AggregateId,
    ) -> Result<PlayerStatistics, DomainError> {
        self.host
            .state(player_id)
            .await?
            .statistics()
            .ok_or(DomainError::NotInitialized {
                aggregate_type: Player::aggregate_type(),
                aggregate_id: player_id,
            })
    }

    /// Loads a player by ID.
    ///
    /// Returns None if the player doesn't exist.
    pub async fn get_player(&self, player_id: AggregateId) -> Result<Option<Player>, DomainError> {
        let player = self.host.state(player_id).await?;
        Ok(player.is_initialized().then_some(player))
    }
}
