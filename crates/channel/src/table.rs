use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::{Delivery, EventChannel, HandlerError, KeyFilter, Result};

/// Something that reacts to messages arriving on a topic.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, delivery: Delivery) -> std::result::Result<(), HandlerError>;
}

struct Registration {
    name: &'static str,
    topic: String,
    filter: KeyFilter,
    handler: Arc<dyn EnvelopeHandler>,
}

/// Namespace-wide subscriptions, declared once at startup.
///
/// Each entry binds a topic to a handler. [`SubscriptionTable::spawn`] opens
/// the subscriptions and runs one dispatcher task per entry. A dispatcher
/// processes its deliveries one at a time, so per-key publish order is the
/// order the handler sees.
#[derive(Default)]
pub struct SubscriptionTable {
    registrations: Vec<Registration>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every key on `topic`.
    pub fn register(
        self,
        name: &'static str,
        topic: impl Into<String>,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Self {
        self.register_filtered(name, topic, KeyFilter::Any, handler)
    }

    pub fn register_filtered(
        mut self,
        name: &'static str,
        topic: impl Into<String>,
        filter: KeyFilter,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Self {
        self.registrations.push(Registration {
            name,
            topic: topic.into(),
            filter,
            handler,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Opens every subscription and starts its dispatcher.
    ///
    /// All subscriptions are open when this returns, so nothing published
    /// afterwards is missed.
    pub async fn spawn<C>(self, channel: &C) -> Result<SubscriptionSet>
    where
        C: EventChannel + ?Sized,
    {
        let mut tasks = Vec::with_capacity(self.registrations.len());

        for registration in self.registrations {
            let mut subscription = channel
                .subscribe(&registration.topic, registration.filter)
                .await?;
            let Registration {
                name,
                topic,
                handler,
                ..
            } = registration;

            tracing::info!(handler = name, %topic, "subscription started");

            tasks.push(tokio::spawn(async move {
                while let Some(delivery) = subscription.recv().await {
                    let event_id = delivery.envelope.event_id;
                    if let Err(e) = handler.handle(delivery).await {
                        tracing::warn!(
                            handler = name,
                            %topic,
                            %event_id,
                            error = %e,
                            "handler failed"
                        );
                        metrics::counter!("subscription_handler_failures_total", "handler" => name)
                            .increment(1);
                    }
                }
                tracing::debug!(handler = name, %topic, "subscription ended");
            }));
        }

        Ok(SubscriptionSet { tasks })
    }
}

/// Running dispatchers started from a [`SubscriptionTable`].
pub struct SubscriptionSet {
    tasks: Vec<JoinHandle<()>>,
}

impl SubscriptionSet {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stops every dispatcher. Undelivered messages are dropped.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}
