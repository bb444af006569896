//! Partitioned publish/subscribe for event envelopes.
//!
//! Messages are published to a named topic under a key (the producing
//! aggregate's identity, or the target identity for requests). Subscribers
//! pick a topic and either one exact key or every key.
//!
//! Delivery is at-least-once with no deduplication; ordering is only
//! guaranteed between messages that share a topic and key.

mod error;
mod filter;
mod memory;
mod subscription;
mod table;

use async_trait::async_trait;

pub use common::AggregateId;
pub use error::{ChannelError, HandlerError, Result};
pub use event_store::EventEnvelope;
pub use filter::KeyFilter;
pub use memory::InMemoryEventChannel;
pub use subscription::{Delivery, Subscription};
pub use table::{EnvelopeHandler, SubscriptionSet, SubscriptionTable};

/// A topic/key partitioned pub/sub transport.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Publishes an envelope on `topic` under `key`.
    ///
    /// Returns once the transport has accepted the message. It does not wait
    /// for subscribers to process it.
    async fn publish(&self, topic: &str, key: AggregateId, envelope: EventEnvelope) -> Result<()>;

    /// Opens a subscription to `topic`, restricted by `filter`.
    async fn subscribe(&self, topic: &str, filter: KeyFilter) -> Result<Subscription>;
}

#[async_trait]
impl<T: EventChannel + ?Sized> EventChannel for std::sync::Arc<T> {
    async fn publish(&self, topic: &str, key: AggregateId, envelope: EventEnvelope) -> Result<()> {
        (**self).publish(topic, key, envelope).await
    }

    async fn subscribe(&self, topic: &str, filter: KeyFilter) -> Result<Subscription> {
        (**self).subscribe(topic, filter).await
    }
}
