//! Reactive achievement rules.
//!
//! The [`RuleEngine`] listens to player discoveries, counts each one in the
//! player's [`AchievementProgress`] and unlocks whatever the configured
//! [`AchievementRule`]s say the discovery has earned.

pub mod engine;
pub mod error;
pub mod progress;
pub mod rule;

pub use engine::RuleEngine;
pub use error::{Result, RuleError};
pub use progress::{
    AchievementProgress, DiscoveryTalliedData, PROGRESS_TOPIC, ProgressEvent, RecordDiscovery,
    progress_id,
};
pub use rule::{AchievementRule, DiscoveryMilestone, EarlyBird, default_rules};
