use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;

use crate::{AggregateId, EventEnvelope, KeyFilter};

/// One message as seen by a subscriber.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub key: AggregateId,
    pub envelope: EventEnvelope,
}

/// Receiving end of a subscription.
///
/// Dropping it unsubscribes; the transport prunes the closed queue on its
/// next publish to the topic.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    filter: KeyFilter,
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn new(
        topic: impl Into<String>,
        filter: KeyFilter,
        receiver: mpsc::UnboundedReceiver<Delivery>,
    ) -> Self {
        Self {
            topic: topic.into(),
            filter,
            receiver,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn filter(&self) -> KeyFilter {
        self.filter
    }

    /// Waits for the next delivery. `None` once the transport has gone away.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    /// Returns a delivery if one is already queued.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.receiver.try_recv().ok()
    }

    /// Stops accepting new deliveries. Already queued ones can still be drained.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Stream for Subscription {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
