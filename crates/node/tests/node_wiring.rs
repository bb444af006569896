//! End-to-end tests of a node running on in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::{DiscoverRecipe, InitializePlayer};
use event_store::{AggregateId, InMemoryEventStore};
use node::{Config, Node};
use saga::SaveOperation;
use timer::InMemoryReminderStore;

fn config() -> Config {
    Config {
        reconcile_interval: Duration::from_millis(50),
        ..Config::default()
    }
}

async fn start() -> Node<InMemoryEventStore> {
    Node::start(
        InMemoryEventStore::new(),
        Arc::new(InMemoryReminderStore::new()),
        &config(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn discoveries_unlock_achievements() {
    let node = start().await;
    let player = AggregateId::new();
    let joined_at = Utc::now();

    node.players
        .initialize_player(InitializePlayer::new(player, "Ilse", joined_at))
        .await
        .unwrap();
    node.players
        .discover_recipe(DiscoverRecipe::new(player, "salt", joined_at))
        .await
        .unwrap();

    let unlocked = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(unlocked) = node.achievements.unlocked(player).await {
                return unlocked;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(
        unlocked
            .iter()
            .any(|a| a.achievement_id.as_str() == "first-discovery")
    );

    node.shutdown().await;
}

#[tokio::test]
async fn saga_completes_through_workers_and_timer() {
    let node = start().await;
    let saga_id = AggregateId::new();
    let children = [AggregateId::new(), AggregateId::new(), AggregateId::new()];

    node.sagas
        .save_operation(SaveOperation::new(saga_id, AggregateId::new(), children))
        .await
        .unwrap();

    let state = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = node.sagas.status(saga_id).await.unwrap();
            if state.is_completed {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(state.completed_child_ids.len(), 3);

    node.shutdown().await;
}
