//! Integration tests for the Player and Achievements aggregates.
//!
//! These run the full command path through actor hosts backed by the
//! in-memory event store and channel.

use std::sync::Arc;

use channel::{EventChannel, InMemoryEventChannel, KeyFilter};
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::AggregateId;
use domain::achievements::{ACHIEVEMENTS_TOPIC, ledger_id};
use domain::player::{PLAYER_DISCOVERIES_TOPIC, PLAYER_LIFECYCLE_TOPIC};
use domain::{
    AchievementService, Aggregate, CommandHandler, DiscoverRecipe, DomainError, FixedClock,
    HostConfig, InitializePlayer, Player, PlayerService, UnlockAchievement, ValidationOutcome,
};
use event_store::{EventStore, InMemoryEventStore, Version};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 12, 5, 45, 0).unwrap()
}

struct Fixture {
    store: InMemoryEventStore,
    channel: InMemoryEventChannel,
    players: PlayerService<InMemoryEventStore>,
    achievements: AchievementService<InMemoryEventStore>,
}

fn fixture() -> Fixture {
    let store = InMemoryEventStore::new();
    let channel = InMemoryEventChannel::new();
    let clock = Arc::new(FixedClock(now()));

    let players = PlayerService::new(
        CommandHandler::new(store.clone(), Arc::new(channel.clone())).with_clock(clock.clone()),
        HostConfig::default(),
    );
    let achievements = AchievementService::new(
        CommandHandler::new(store.clone(), Arc::new(channel.clone())).with_clock(clock),
        HostConfig::default(),
    );

    Fixture {
        store,
        channel,
        players,
        achievements,
    }
}

mod player_lifecycle {
    use super::*;

    #[tokio::test]
    async fn initialize_and_discover() {
        let f = fixture();
        let player = AggregateId::new();

        let result = f
            .players
            .initialize_player(InitializePlayer::new(player, "Mira", now() - Duration::days(3)))
            .await
            .unwrap();
        assert_eq!(result.new_version, Version::first());

        for (i, recipe) in ["fire", "steam", "cloud"].into_iter().enumerate() {
            f.players
                .discover_recipe(DiscoverRecipe::new(
                    player,
                    recipe,
                    now() - Duration::minutes(10 - i as i64),
                ))
                .await
                .unwrap();
        }

        let stats = f.players.statistics(player).await.unwrap();
        assert_eq!(stats.display_name, "Mira");
        assert_eq!(stats.discoveries, 3);
        assert_eq!(stats.last_discovery_at, Some(now() - Duration::minutes(8)));
        assert_eq!(
            f.store.get_aggregate_version(player).await.unwrap(),
            Some(Version::new(4))
        );
    }

    #[tokio::test]
    async fn statistics_before_initialize_is_not_initialized() {
        let f = fixture();
        let err = f.players.statistics(AggregateId::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotInitialized { aggregate_type: "Player", .. }));
        assert!(f.players.get_player(AggregateId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reinitialize_is_rejected_every_time() {
        let f = fixture();
        let player = AggregateId::new();
        f.players
            .initialize_player(InitializePlayer::new(player, "Mira", now()))
            .await
            .unwrap();
        let before = f.players.get_player(player).await.unwrap();

        for _ in 0..2 {
            let result = f
                .players
                .initialize_player(InitializePlayer::new(player, "Impostor", now()))
                .await
                .unwrap();
            assert!(result.outcome.is_rejected());
            assert!(result.envelope.is_none());
        }

        assert_eq!(f.players.get_player(player).await.unwrap(), before);
        assert_eq!(f.store.event_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_discovery_is_successful_no_op() {
        let f = fixture();
        let player = AggregateId::new();
        let mut discoveries = f
            .channel
            .subscribe(PLAYER_DISCOVERIES_TOPIC, KeyFilter::Exact(player))
            .await
            .unwrap();

        f.players
            .initialize_player(InitializePlayer::new(player, "Mira", now()))
            .await
            .unwrap();
        let first = f
            .players
            .discover_recipe(DiscoverRecipe::new(player, "steam", now()))
            .await
            .unwrap();
        let second = f
            .players
            .discover_recipe(DiscoverRecipe::new(player, "steam", now()))
            .await
            .unwrap();

        assert!(first.event().is_some());
        assert!(matches!(second.outcome, ValidationOutcome::Accepted(None)));
        assert_eq!(second.new_version, first.new_version);

        assert!(discoveries.recv().await.is_some());
        assert!(discoveries.try_recv().is_none());
    }

    #[tokio::test]
    async fn validator_reports_every_violation() {
        let f = fixture();
        let player = AggregateId::new();

        let result = f
            .players
            .discover_recipe(DiscoverRecipe::new(player, " ", now() + Duration::hours(2)))
            .await
            .unwrap();

        let reasons = result.outcome.rejection().unwrap().reasons().to_vec();
        assert_eq!(reasons.len(), 3, "{reasons:?}");
        assert!(reasons.iter().any(|r| r == "recipe_id is required"));
        assert!(reasons.iter().any(|r| r.contains("in the future")));
        assert!(reasons.iter().any(|r| r == "player is not initialized"));
    }

    #[tokio::test]
    async fn events_land_on_their_topics() {
        let f = fixture();
        let player = AggregateId::new();
        let mut lifecycle = f
            .channel
            .subscribe(PLAYER_LIFECYCLE_TOPIC, KeyFilter::Any)
            .await
            .unwrap();
        let mut discoveries = f
            .channel
            .subscribe(PLAYER_DISCOVERIES_TOPIC, KeyFilter::Any)
            .await
            .unwrap();

        f.players
            .initialize_player(InitializePlayer::new(player, "Mira", now()))
            .await
            .unwrap();
        f.players
            .discover_recipe(DiscoverRecipe::new(player, "fire", now()))
            .await
            .unwrap();

        let initialized = lifecycle.recv().await.unwrap();
        assert_eq!(initialized.key, player);
        assert_eq!(initialized.envelope.event_type, "PlayerInitialized");

        let discovered = discoveries.recv().await.unwrap();
        assert_eq!(discovered.envelope.event_type, "RecipeDiscovered");
        assert_eq!(discovered.envelope.version, Version::new(2));
        assert!(lifecycle.try_recv().is_none());
    }
}

mod replay {
    use super::*;

    #[tokio::test]
    async fn replay_is_deterministic() {
        let f = fixture();
        let player = AggregateId::new();
        f.players
            .initialize_player(InitializePlayer::new(player, "Mira", now()))
            .await
            .unwrap();
        for recipe in ["fire", "water", "steam", "mud"] {
            f.players
                .discover_recipe(DiscoverRecipe::new(player, recipe, now()))
                .await
                .unwrap();
        }
        let live = f.players.get_player(player).await.unwrap().unwrap();

        let handler: CommandHandler<_, Player> =
            CommandHandler::new(f.store.clone(), Arc::new(InMemoryEventChannel::new()));
        let first = handler.load(player).await.unwrap();
        let second = handler.load(player).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, live);
        assert_eq!(first.version(), Version::new(5));
    }

    #[tokio::test]
    async fn restarted_host_rehydrates_from_the_log() {
        let f = fixture();
        let player = AggregateId::new();
        f.players
            .initialize_player(InitializePlayer::new(player, "Mira", now()))
            .await
            .unwrap();
        f.players
            .discover_recipe(DiscoverRecipe::new(player, "fire", now()))
            .await
            .unwrap();

        f.players.host().shutdown().await;

        let duplicate = f
            .players
            .discover_recipe(DiscoverRecipe::new(player, "fire", now()))
            .await
            .unwrap();
        assert!(matches!(duplicate.outcome, ValidationOutcome::Accepted(None)));
        assert_eq!(f.players.statistics(player).await.unwrap().discoveries, 1);
    }
}

mod infrastructure_failures {
    use super::*;

    #[tokio::test]
    async fn append_failure_changes_nothing_and_publishes_nothing() {
        let f = fixture();
        let player = AggregateId::new();
        let mut lifecycle = f
            .channel
            .subscribe(PLAYER_LIFECYCLE_TOPIC, KeyFilter::Any)
            .await
            .unwrap();

        f.store.set_fail_appends(true);
        let err = f
            .players
            .initialize_player(InitializePlayer::new(player, "Mira", now()))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::EventStore(_)));
        assert!(f.players.get_player(player).await.unwrap().is_none());
        assert!(lifecycle.try_recv().is_none());
    }

    #[tokio::test]
    async fn publish_failure_reports_channel_error_but_keeps_the_event() {
        let f = fixture();
        let player = AggregateId::new();

        f.channel.set_fail_publishes(true);
        let err = f
            .players
            .initialize_player(InitializePlayer::new(player, "Mira", now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Channel(_)));

        f.channel.set_fail_publishes(false);
        assert!(f.players.statistics(player).await.is_ok());
    }
}

mod achievements {
    use super::*;

    #[tokio::test]
    async fn unlock_lives_in_its_own_log() {
        let f = fixture();
        let player = AggregateId::new();
        let mut unlocked = f
            .channel
            .subscribe(ACHIEVEMENTS_TOPIC, KeyFilter::Exact(ledger_id(player)))
            .await
            .unwrap();

        f.players
            .initialize_player(InitializePlayer::new(player, "Mira", now()))
            .await
            .unwrap();
        f.achievements
            .unlock_achievement(UnlockAchievement::new(player, "early-bird", now()))
            .await
            .unwrap();

        let list = f.achievements.unlocked(player).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].achievement_id.as_str(), "early-bird");

        assert_eq!(
            f.store.get_aggregate_version(player).await.unwrap(),
            Some(Version::first())
        );
        assert_eq!(
            f.store.get_aggregate_version(ledger_id(player)).await.unwrap(),
            Some(Version::first())
        );
        assert_eq!(
            unlocked.recv().await.unwrap().envelope.event_type,
            "AchievementUnlocked"
        );
    }

    #[tokio::test]
    async fn second_unlock_is_rejected() {
        let f = fixture();
        let player = AggregateId::new();
        let cmd = UnlockAchievement::new(player, "first-discovery", now());

        assert!(f
            .achievements
            .unlock_achievement(cmd.clone())
            .await
            .unwrap()
            .outcome
            .is_accepted());
        assert!(f
            .achievements
            .unlock_achievement(cmd)
            .await
            .unwrap()
            .outcome
            .is_rejected());
    }

    #[tokio::test]
    async fn unlocked_before_first_unlock_is_not_initialized() {
        let f = fixture();
        let err = f.achievements.unlocked(AggregateId::new()).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::NotInitialized {
                aggregate_type: "Achievements",
                ..
            }
        ));
    }
}
