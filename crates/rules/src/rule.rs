//! Achievement rules.

use domain::AchievementId;
use domain::player::RecipeDiscoveredData;

use crate::progress::{AchievementProgress, is_early};

/// A condition that unlocks an achievement in reaction to a discovery.
///
/// Rules are evaluated against the discovery and the player's progress after
/// it has been counted. They must be deterministic so that a discovery
/// evaluated twice gives the same answer.
pub trait AchievementRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the achievement to unlock, if this discovery earns one.
    fn evaluate(
        &self,
        discovery: &RecipeDiscoveredData,
        progress: &AchievementProgress,
    ) -> Option<AchievementId>;
}

/// Fires when the discovery count reaches exactly `threshold`.
#[derive(Debug, Clone)]
pub struct DiscoveryMilestone {
    name: &'static str,
    threshold: u32,
    achievement: AchievementId,
}

impl DiscoveryMilestone {
    pub fn new(name: &'static str, threshold: u32, achievement: impl Into<AchievementId>) -> Self {
        Self {
            name,
            threshold,
            achievement: achievement.into(),
        }
    }

    pub fn first_discovery() -> Self {
        Self::new("first_discovery", 1, "first-discovery")
    }

    pub fn apprentice_alchemist() -> Self {
        Self::new("apprentice_alchemist", 10, "apprentice-alchemist")
    }

    pub fn master_alchemist() -> Self {
        Self::new("master_alchemist", 50, "master-alchemist")
    }
}

impl AchievementRule for DiscoveryMilestone {
    fn name(&self) -> &'static str {
        self.name
    }

    fn evaluate(
        &self,
        _: &RecipeDiscoveredData,
        progress: &AchievementProgress,
    ) -> Option<AchievementId> {
        (progress.discoveries() == self.threshold).then(|| self.achievement.clone())
    }
}

/// Fires on the first discovery made before dawn, UTC.
#[derive(Debug, Clone, Default)]
pub struct EarlyBird;

impl AchievementRule for EarlyBird {
    fn name(&self) -> &'static str {
        "early_bird"
    }

    fn evaluate(
        &self,
        discovery: &RecipeDiscoveredData,
        progress: &AchievementProgress,
    ) -> Option<AchievementId> {
        (is_early(discovery.discovered_at) && progress.early_discoveries() == 1)
            .then(|| AchievementId::new("early-bird"))
    }
}

/// The built-in rule set, in evaluation order.
pub fn default_rules() -> Vec<Box<dyn AchievementRule>> {
    vec![
        Box::new(DiscoveryMilestone::first_discovery()),
        Box::new(DiscoveryMilestone::apprentice_alchemist()),
        Box::new(DiscoveryMilestone::master_alchemist()),
        Box::new(EarlyBird),
    ]
}
