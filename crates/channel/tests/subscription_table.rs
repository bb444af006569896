use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use channel::{
    AggregateId, Delivery, EnvelopeHandler, EventChannel, EventEnvelope, HandlerError,
    InMemoryEventChannel, SubscriptionTable,
};
use event_store::Version;
use tokio::sync::Mutex;

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(AggregateId, Version)>>,
    fail_on: Option<Version>,
}

#[async_trait]
impl EnvelopeHandler for Recorder {
    async fn handle(&self, delivery: Delivery) -> Result<(), HandlerError> {
        if self.fail_on == Some(delivery.envelope.version) {
            return Err(HandlerError::new("refused"));
        }
        self.seen
            .lock()
            .await
            .push((delivery.key, delivery.envelope.version));
        Ok(())
    }
}

fn envelope(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Player")
        .event_type("RecipeDiscovered")
        .version(Version::new(version))
        .payload_raw(serde_json::json!({}))
        .build()
        .unwrap()
}

async fn wait_for(recorder: &Recorder, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if recorder.seen.lock().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn dispatcher_preserves_per_key_order() {
    let channel = InMemoryEventChannel::new();
    let recorder = Arc::new(Recorder::default());

    let set = SubscriptionTable::new()
        .register("recorder", "player-discoveries", recorder.clone())
        .spawn(&channel)
        .await
        .unwrap();
    assert_eq!(set.len(), 1);

    let a = AggregateId::new();
    let b = AggregateId::new();
    for v in 1..=3 {
        channel
            .publish("player-discoveries", a, envelope(a, v))
            .await
            .unwrap();
        channel
            .publish("player-discoveries", b, envelope(b, v))
            .await
            .unwrap();
    }

    wait_for(&recorder, 6).await;
    let seen = recorder.seen.lock().await.clone();
    let for_a: Vec<_> = seen.iter().filter(|(k, _)| *k == a).map(|(_, v)| *v).collect();
    assert_eq!(for_a, vec![Version::new(1), Version::new(2), Version::new(3)]);

    set.shutdown();
}

#[tokio::test]
async fn handler_failure_does_not_stop_dispatch() {
    let channel = InMemoryEventChannel::new();
    let recorder = Arc::new(Recorder {
        fail_on: Some(Version::new(1)),
        ..Default::default()
    });

    let set = SubscriptionTable::new()
        .register("recorder", "t", recorder.clone())
        .spawn(&channel)
        .await
        .unwrap();

    let a = AggregateId::new();
    channel.publish("t", a, envelope(a, 1)).await.unwrap();
    channel.publish("t", a, envelope(a, 2)).await.unwrap();

    wait_for(&recorder, 1).await;
    assert_eq!(*recorder.seen.lock().await, vec![(a, Version::new(2))]);

    set.shutdown();
}
