//! The reactive rule engine.

use std::sync::Arc;

use async_trait::async_trait;
use channel::{Delivery, EnvelopeHandler, HandlerError, SubscriptionTable};
use common::AggregateId;
use domain::player::{PLAYER_DISCOVERIES_TOPIC, RecipeDiscoveredData};
use domain::{
    AchievementService, AggregateHost, CommandHandler, DomainError, HostConfig, PlayerEvent,
    UnlockAchievement,
};
use event_store::{EventEnvelope, EventStore};

use crate::Result;
use crate::progress::{AchievementProgress, RecordDiscovery, progress_id};
use crate::rule::AchievementRule;

/// Turns `RecipeDiscovered` events into achievement unlocks.
///
/// Each discovery is first counted in the player's [`AchievementProgress`].
/// Only a discovery that was counted for the first time is run through the
/// rules, so redelivery never unlocks anything twice.
pub struct RuleEngine<S: EventStore> {
    progress: AggregateHost<S, AchievementProgress>,
    achievements: AchievementService<S>,
    rules: Vec<Box<dyn AchievementRule>>,
}

impl<S: EventStore + 'static> RuleEngine<S> {
    pub fn new(
        progress: CommandHandler<S, AchievementProgress>,
        achievements: AchievementService<S>,
        config: HostConfig,
    ) -> Self {
        Self {
            progress: AggregateHost::new(progress, config),
            achievements,
            rules: Vec::new(),
        }
    }

    /// Appends a rule. Rules are evaluated in registration order.
    pub fn with_rule(mut self, rule: impl AchievementRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = Box<dyn AchievementRule>>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Registers the engine on the discoveries topic.
    pub fn subscribe(self, table: SubscriptionTable) -> SubscriptionTable {
        table.register("achievement-rules", PLAYER_DISCOVERIES_TOPIC, Arc::new(self))
    }

    /// The player's progress as the engine last counted it.
    pub async fn progress(
        &self,
        player_id: AggregateId,
    ) -> std::result::Result<AchievementProgress, DomainError> {
        self.progress.state(progress_id(player_id)).await
    }

    /// Processes one envelope from the discoveries topic.
    ///
    /// Returns the number of achievements unlocked.
    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id))]
    pub async fn process(&self, envelope: &EventEnvelope) -> Result<usize> {
        let PlayerEvent::RecipeDiscovered(discovery) = envelope.decode::<PlayerEvent>()? else {
            tracing::debug!(event_type = %envelope.event_type, "not a discovery, skipped");
            return Ok(0);
        };

        let record = RecordDiscovery {
            player_id: discovery.player_id,
            source_event_id: envelope.event_id,
            recipe_id: discovery.recipe_id.clone(),
            discovered_at: discovery.discovered_at,
        };
        let counted = self
            .progress
            .send(progress_id(discovery.player_id), record)
            .await?;

        if let Some(rejection) = counted.outcome.rejection() {
            tracing::warn!(
                player_id = %discovery.player_id,
                reasons = %rejection,
                "discovery not counted"
            );
            metrics::counter!(
                "achievement_rule_failures_total",
                "rule" => "progress",
                "reason" => "rejected"
            )
            .increment(1);
            return Ok(0);
        }
        if counted.envelope.is_none() {
            tracing::debug!(player_id = %discovery.player_id, "discovery already counted");
            return Ok(0);
        }

        let mut unlocked = 0;
        for rule in &self.rules {
            if let Some(achievement_id) = rule.evaluate(&discovery, &counted.aggregate)
                && self.unlock(rule.name(), &discovery, achievement_id).await
            {
                unlocked += 1;
            }
        }
        Ok(unlocked)
    }

    async fn unlock(
        &self,
        rule: &'static str,
        discovery: &RecipeDiscoveredData,
        achievement_id: domain::AchievementId,
    ) -> bool {
        let cmd = UnlockAchievement::new(
            discovery.player_id,
            achievement_id.clone(),
            discovery.discovered_at,
        );

        match self.achievements.unlock_achievement(cmd).await {
            Ok(result) => match result.outcome.rejection() {
                None => {
                    tracing::info!(
                        player_id = %discovery.player_id,
                        %achievement_id,
                        rule,
                        "achievement unlocked"
                    );
                    true
                }
                Some(rejection) => {
                    tracing::warn!(
                        player_id = %discovery.player_id,
                        %achievement_id,
                        rule,
                        reasons = %rejection,
                        "unlock rejected"
                    );
                    metrics::counter!(
                        "achievement_rule_failures_total",
                        "rule" => rule,
                        "reason" => "rejected"
                    )
                    .increment(1);
                    false
                }
            },
            Err(e) => {
                tracing::warn!(
                    player_id = %discovery.player_id,
                    %achievement_id,
                    rule,
                    error = %e,
                    "unlock failed"
                );
                metrics::counter!(
                    "achievement_rule_failures_total",
                    "rule" => rule,
                    "reason" => "infrastructure"
                )
                .increment(1);
                false
            }
        }
    }
}

#[async_trait]
impl<S: EventStore + 'static> EnvelopeHandler for RuleEngine<S> {
    async fn handle(&self, delivery: Delivery) -> std::result::Result<(), HandlerError> {
        self.process(&delivery.envelope)
            .await
            .map(|_| ())
            .map_err(HandlerError::new)
    }
}
