use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::{
    AggregateId, ChannelError, Delivery, EventChannel, EventEnvelope, KeyFilter, Result,
    Subscription,
};

struct Subscriber {
    filter: KeyFilter,
    sender: mpsc::UnboundedSender<Delivery>,
}

/// In-process channel that fans each message out to every matching subscriber.
///
/// Each subscriber owns an unbounded FIFO queue, so a single publisher's
/// messages arrive in publish order. Messages published while nobody is
/// subscribed are dropped.
#[derive(Clone, Default)]
pub struct InMemoryEventChannel {
    topics: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
    fail_publishes: Arc<AtomicBool>,
}

impl InMemoryEventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail with `Unavailable` until switched off.
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Number of live subscriptions on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|subs| subs.iter().filter(|s| !s.sender.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventChannel for InMemoryEventChannel {
    async fn publish(&self, topic: &str, key: AggregateId, envelope: EventEnvelope) -> Result<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(ChannelError::Unavailable(format!(
                "publish to {topic} refused"
            )));
        }

        let mut topics = self.topics.write().await;
        let Some(subscribers) = topics.get_mut(topic) else {
            tracing::trace!(topic, %key, "no subscribers, message dropped");
            return Ok(());
        };

        subscribers.retain(|s| !s.sender.is_closed());

        let mut delivered = 0usize;
        for subscriber in subscribers.iter().filter(|s| s.filter.matches(&key)) {
            let delivery = Delivery {
                topic: topic.to_string(),
                key,
                envelope: envelope.clone(),
            };
            if subscriber.sender.send(delivery).is_ok() {
                delivered += 1;
            }
        }

        tracing::trace!(topic, %key, delivered, event_type = %envelope.event_type, "published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, filter: KeyFilter) -> Result<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber { filter, sender });

        tracing::debug!(topic, ?filter, "subscribed");
        Ok(Subscription::new(topic, filter, receiver))
    }
}

#[cfg(test)]
mod tests {
    use event_store::Version;

    use super::*;

    fn envelope(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Player")
            .event_type("RecipeDiscovered")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({ "n": version }))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn exact_subscriber_sees_only_its_key() {
        let channel = InMemoryEventChannel::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        let mut sub = channel
            .subscribe("player-discoveries", KeyFilter::Exact(a))
            .await
            .unwrap();

        channel
            .publish("player-discoveries", b, envelope(b, 1))
            .await
            .unwrap();
        channel
            .publish("player-discoveries", a, envelope(a, 1))
            .await
            .unwrap();

        let delivery = sub.recv().await.unwrap();
        assert_eq!(delivery.key, a);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn any_subscriber_sees_every_key_in_order() {
        let channel = InMemoryEventChannel::new();
        let a = AggregateId::new();
        let mut sub = channel
            .subscribe("player-discoveries", KeyFilter::Any)
            .await
            .unwrap();

        for v in 1..=5 {
            channel
                .publish("player-discoveries", a, envelope(a, v))
                .await
                .unwrap();
        }

        for v in 1..=5 {
            let delivery = sub.recv().await.unwrap();
            assert_eq!(delivery.envelope.version, Version::new(v));
        }
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let channel = InMemoryEventChannel::new();
        let a = AggregateId::new();
        let mut sub = channel.subscribe("left", KeyFilter::Any).await.unwrap();

        channel.publish("right", a, envelope(a, 1)).await.unwrap();
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let channel = InMemoryEventChannel::new();
        let a = AggregateId::new();
        let sub = channel.subscribe("t", KeyFilter::Any).await.unwrap();
        assert_eq!(channel.subscriber_count("t").await, 1);

        drop(sub);
        channel.publish("t", a, envelope(a, 1)).await.unwrap();
        assert_eq!(channel.subscriber_count("t").await, 0);
    }

    #[tokio::test]
    async fn fault_injection_fails_publish() {
        let channel = InMemoryEventChannel::new();
        let a = AggregateId::new();
        let mut sub = channel.subscribe("t", KeyFilter::Any).await.unwrap();

        channel.set_fail_publishes(true);
        let result = channel.publish("t", a, envelope(a, 1)).await;
        assert!(matches!(result, Err(ChannelError::Unavailable(_))));
        assert!(sub.try_recv().is_none());

        channel.set_fail_publishes(false);
        channel.publish("t", a, envelope(a, 1)).await.unwrap();
        assert!(sub.try_recv().is_some());
    }
}
