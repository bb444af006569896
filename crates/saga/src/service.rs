//! Saga service: hosts coordinators and wires them to the channel and timer.
//!
//! The coordinator aggregate only decides. Everything it needs done outside
//! its own log happens in [`SagaHooks`], which run inside the coordinator's
//! actor after each event:
//!
//! - `OperationPending`: listen for each child's confirmation, publish one
//!   `ChildRequested` per child, schedule the reconcile reminder
//! - `ChildCompleted`: stop listening to that child
//! - `OperationCompleted`: cancel the reminder and stop listening entirely

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use channel::{EventChannel, KeyFilter, Subscription};
use common::AggregateId;
use domain::{
    ActorHooks, Aggregate, AggregateHost, CommandHandler, CommandResult, DomainError, HostConfig,
    WeakHost,
};
use event_store::{EventEnvelope, EventStore};
use timer::{Reminder, ReminderHandle, Tick, TickSink, TimerError, TimerService};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::Result;
use crate::commands::{ConfirmChild, Reconcile, SaveOperation};
use crate::coordinator::SagaCoordinator;
use crate::events::{
    CHILD_CONFIRMED_TOPIC, CHILD_REQUESTED_TOPIC, ChildRequested, OperationPendingData, SagaEvent,
};
use crate::state::SagaState;
use crate::task::TaskEvent;

/// Name of the reminder that drives [`Reconcile`].
pub const RECONCILE_REMINDER: &str = "reconcile";

const CONFIRM_RETRY_INITIAL: Duration = Duration::from_millis(50);
const CONFIRM_RETRY_MAX: Duration = Duration::from_secs(2);

/// Saga service configuration.
#[derive(Debug, Clone, Copy)]
pub struct SagaConfig {
    /// How often an active coordinator checks whether it is done.
    pub reconcile_interval: Duration,
    pub host: HostConfig,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(5),
            host: HostConfig::default(),
        }
    }
}

/// Upward interface for saga coordinators.
pub struct SagaService<S: EventStore> {
    host: AggregateHost<S, SagaCoordinator>,
}

impl<S: EventStore> Clone for SagaService<S> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
        }
    }
}

impl<S: EventStore + 'static> SagaService<S> {
    pub fn new(
        handler: CommandHandler<S, SagaCoordinator>,
        timer: TimerService,
        config: SagaConfig,
    ) -> Self {
        let channel = Arc::clone(handler.channel());
        let host = AggregateHost::with_hooks(handler, config.host, |host| {
            Arc::new(SagaHooks {
                host,
                channel,
                timer,
                reconcile_interval: config.reconcile_interval,
                forwarders: Mutex::new(HashMap::new()),
            })
        });
        Self { host }
    }

    pub fn host(&self) -> &AggregateHost<S, SagaCoordinator> {
        &self.host
    }

    #[tracing::instrument(
        skip(self, cmd),
        fields(saga_id = %cmd.saga_id, children = cmd.child_ids.len())
    )]
    pub async fn save_operation(
        &self,
        cmd: SaveOperation,
    ) -> Result<CommandResult<SagaCoordinator>> {
        Ok(self.host.send(cmd.saga_id, cmd.into()).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn confirm_child(&self, cmd: ConfirmChild) -> Result<CommandResult<SagaCoordinator>> {
        Ok(self.host.send(cmd.saga_id, cmd.into()).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, cmd: Reconcile) -> Result<CommandResult<SagaCoordinator>> {
        Ok(self.host.send(cmd.saga_id, cmd.into()).await?)
    }

    /// The coordinator's progress. Fails before an operation was saved.
    pub async fn status(&self, saga_id: AggregateId) -> Result<SagaState> {
        let saga = self.host.state(saga_id).await?;
        if !saga.is_active() {
            return Err(DomainError::NotInitialized {
                aggregate_type: SagaCoordinator::aggregate_type(),
                aggregate_id: saga_id,
            }
            .into());
        }
        Ok(saga.state())
    }

    /// A sink that turns reconcile ticks into [`Reconcile`] commands.
    pub fn tick_sink(&self) -> Arc<dyn TickSink> {
        Arc::new(SagaTickSink {
            host: self.host.clone(),
        })
    }
}

type Forwarders = HashMap<AggregateId, HashMap<AggregateId, JoinHandle<()>>>;

/// Side effects of coordinator events.
struct SagaHooks<S: EventStore> {
    host: WeakHost<S, SagaCoordinator>,
    channel: Arc<dyn EventChannel>,
    timer: TimerService,
    reconcile_interval: Duration,
    /// Confirmation listeners, by saga then child.
    forwarders: Mutex<Forwarders>,
}

impl<S: EventStore + 'static> SagaHooks<S> {
    /// Makes sure a listener runs for every child in `children`.
    async fn listen(&self, saga_id: AggregateId, children: impl IntoIterator<Item = AggregateId>) {
        for child_id in children {
            {
                let forwarders = self.forwarders.lock().await;
                if forwarders
                    .get(&saga_id)
                    .and_then(|children| children.get(&child_id))
                    .is_some_and(|task| !task.is_finished())
                {
                    continue;
                }
            }

            let subscription = match self
                .channel
                .subscribe(CHILD_CONFIRMED_TOPIC, KeyFilter::Exact(child_id))
                .await
            {
                Ok(subscription) => subscription,
                Err(e) => {
                    tracing::error!(
                        %saga_id,
                        %child_id,
                        error = %e,
                        "cannot listen for child confirmation"
                    );
                    continue;
                }
            };

            let task = tokio::spawn(forward_confirmations(
                self.host.clone(),
                saga_id,
                child_id,
                subscription,
            ));
            if let Some(previous) = self
                .forwarders
                .lock()
                .await
                .entry(saga_id)
                .or_default()
                .insert(child_id, task)
            {
                previous.abort();
            }
        }
    }

    async fn stop_listening(&self, saga_id: AggregateId, child_id: AggregateId) {
        let mut forwarders = self.forwarders.lock().await;
        if let Some(children) = forwarders.get_mut(&saga_id) {
            if let Some(task) = children.remove(&child_id) {
                task.abort();
            }
            if children.is_empty() {
                forwarders.remove(&saga_id);
            }
        }
    }

    async fn stop_all(&self, saga_id: AggregateId) {
        if let Some(children) = self.forwarders.lock().await.remove(&saga_id) {
            for task in children.into_values() {
                task.abort();
            }
        }
    }

    async fn request_children(&self, data: &OperationPendingData, envelope: &EventEnvelope) {
        for &child_id in &data.child_ids {
            let request = ChildRequested {
                saga_id: data.saga_id,
                operation_id: data.operation_id,
                child_id,
            };
            let published = match child_request(&request, envelope) {
                Ok(message) => self
                    .channel
                    .publish(CHILD_REQUESTED_TOPIC, child_id, message)
                    .await
                    .map_err(crate::SagaError::from),
                Err(e) => Err(e),
            };

            if let Err(e) = published {
                tracing::warn!(
                    saga_id = %data.saga_id,
                    %child_id,
                    error = %e,
                    "child request not published"
                );
                metrics::counter!("saga_child_request_failures_total").increment(1);
            }
        }
    }

    /// Schedules the reconcile reminder unless it is already armed.
    async fn ensure_reminder(&self, saga_id: AggregateId) {
        let handle = ReminderHandle::new(saga_id, RECONCILE_REMINDER);
        if self.timer.is_armed(&handle).await {
            return;
        }
        let reminder = Reminder::every(saga_id, RECONCILE_REMINDER, self.reconcile_interval);
        if let Err(e) = self.timer.schedule(reminder).await {
            tracing::error!(%saga_id, error = %e, "reconcile reminder not scheduled");
        }
    }

    async fn cancel_reminder(&self, saga_id: AggregateId) {
        let handle = ReminderHandle::new(saga_id, RECONCILE_REMINDER);
        if let Err(e) = self.timer.cancel(&handle).await {
            tracing::error!(%saga_id, error = %e, "reconcile reminder not cancelled");
        }
    }
}

#[async_trait]
impl<S: EventStore + 'static> ActorHooks<SagaCoordinator> for SagaHooks<S> {
    async fn on_activate(&self, saga_id: AggregateId, saga: &SagaCoordinator) {
        if !saga.is_active() || saga.is_completed() {
            return;
        }
        tracing::info!(%saga_id, pending = saga.pending_child_ids().len(), "resuming saga");
        self.listen(saga_id, saga.pending_child_ids().iter().copied())
            .await;
        self.ensure_reminder(saga_id).await;
    }

    async fn on_event(
        &self,
        saga_id: AggregateId,
        _: &SagaCoordinator,
        event: &SagaEvent,
        envelope: &EventEnvelope,
    ) {
        match event {
            SagaEvent::OperationPending(data) => {
                // Listen first so an immediate confirmation is not missed.
                self.listen(saga_id, data.child_ids.iter().copied()).await;
                self.request_children(data, envelope).await;
                self.ensure_reminder(saga_id).await;
                metrics::counter!("saga_operations_started_total").increment(1);
                tracing::info!(
                    %saga_id,
                    operation_id = %data.operation_id,
                    children = data.child_ids.len(),
                    "operation started"
                );
            }
            SagaEvent::ChildCompleted(data) => {
                self.stop_listening(saga_id, data.child_id).await;
            }
            SagaEvent::OperationCompleted(data) => {
                self.cancel_reminder(saga_id).await;
                self.stop_all(saga_id).await;
                metrics::counter!("saga_operations_completed_total").increment(1);
                tracing::info!(
                    %saga_id,
                    operation_id = %data.operation_id,
                    children = data.children,
                    "operation completed"
                );
            }
        }
    }
}

fn child_request(request: &ChildRequested, pending: &EventEnvelope) -> Result<EventEnvelope> {
    Ok(EventEnvelope::builder()
        .event_type(ChildRequested::EVENT_TYPE)
        .aggregate_id(request.saga_id)
        .aggregate_type(SagaCoordinator::aggregate_type())
        .version(pending.version)
        .timestamp(pending.timestamp)
        .payload(request)?
        .metadata("caused_by", serde_json::json!(pending.event_id))
        .build()?)
}

/// Relays a child's completion to its coordinator as [`ConfirmChild`].
async fn forward_confirmations<S: EventStore + 'static>(
    host: WeakHost<S, SagaCoordinator>,
    saga_id: AggregateId,
    child_id: AggregateId,
    mut subscription: Subscription,
) {
    while let Some(delivery) = subscription.recv().await {
        let completed = match delivery.envelope.decode::<TaskEvent>() {
            Ok(TaskEvent::TaskCompleted(data)) => data,
            Err(e) => {
                tracing::debug!(%saga_id, %child_id, error = %e, "not a task completion, skipped");
                continue;
            }
        };
        if completed.saga_id == saga_id {
            confirm(&host, saga_id, child_id).await;
            return;
        }
    }
}

/// Sends [`ConfirmChild`] until the coordinator has decided on it.
///
/// The completion is never redelivered, so infrastructure failures are
/// retried with backoff for as long as the host is alive.
async fn confirm<S: EventStore + 'static>(
    host: &WeakHost<S, SagaCoordinator>,
    saga_id: AggregateId,
    child_id: AggregateId,
) {
    let mut backoff = CONFIRM_RETRY_INITIAL;
    loop {
        let Some(live) = host.upgrade() else {
            return;
        };
        let sent = live
            .send(saga_id, ConfirmChild::new(saga_id, child_id).into())
            .await;
        drop(live);

        match sent {
            Ok(result) => {
                if let Some(rejection) = result.outcome.rejection() {
                    tracing::debug!(
                        %saga_id,
                        %child_id,
                        reasons = %rejection,
                        "confirmation refused"
                    );
                }
                return;
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(%saga_id, %child_id, error = %e, "confirmation abandoned");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    %saga_id,
                    %child_id,
                    error = %e,
                    retry_in = ?backoff,
                    "confirmation not delivered"
                );
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(CONFIRM_RETRY_MAX);
    }
}

/// Delivers reconcile ticks to coordinators.
struct SagaTickSink<S: EventStore> {
    host: AggregateHost<S, SagaCoordinator>,
}

#[async_trait]
impl<S: EventStore + 'static> TickSink for SagaTickSink<S> {
    async fn deliver(&self, tick: Tick) -> timer::Result<()> {
        if tick.name != RECONCILE_REMINDER {
            tracing::debug!(reminder = %tick.handle(), "not a saga reminder, ignored");
            return Ok(());
        }

        self.host
            .send(tick.owner, Reconcile::new(tick.owner).into())
            .await
            .map(|_| ())
            .map_err(|e| TimerError::Sink(e.to_string()))
    }
}
