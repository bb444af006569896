//! Actor-per-identity hosting for aggregates.
//!
//! Each live aggregate identity is owned by one tokio task that processes its
//! mailbox strictly in order, so an aggregate never sees two commands at once
//! and needs no locking. Actors are spawned lazily on the first message for an
//! identity, rebuild their state by replaying the log, and shut down after
//! sitting idle. The next message re-hydrates them.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use event_store::{EventEnvelope, EventStore};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

/// Tuning for an [`AggregateHost`].
#[derive(Debug, Clone, Copy)]
pub struct HostConfig {
    /// How long an actor waits for a message before deactivating.
    pub idle_timeout: Duration,
    /// Bound of each actor's inbox. Senders wait when it is full.
    pub mailbox_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            mailbox_capacity: 64,
        }
    }
}

impl HostConfig {
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

/// Side effects an aggregate kind attaches to its actor lifecycle.
///
/// Hooks run inside the actor task. They must not send to their own
/// identity through the host and wait for the reply.
#[async_trait]
pub trait ActorHooks<A: Aggregate>: Send + Sync {
    /// Runs once per activation, after replay and before the first message.
    async fn on_activate(&self, _aggregate_id: AggregateId, _state: &A) {}

    /// Runs after an event has been appended, applied and offered to the
    /// channel. `state` already reflects the event.
    async fn on_event(
        &self,
        _aggregate_id: AggregateId,
        _state: &A,
        _event: &A::Event,
        _envelope: &EventEnvelope,
    ) {
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<A: Aggregate> ActorHooks<A> for NoHooks {}

type ExecuteReply<A> = oneshot::Sender<Result<CommandResult<A>, DomainError>>;

enum ActorMessage<A: Aggregate> {
    Execute {
        command: A::Command,
        reply: ExecuteReply<A>,
    },
    GetState {
        reply: oneshot::Sender<Result<A, DomainError>>,
    },
}

impl<A: Aggregate> ActorMessage<A> {
    fn fail(self, error: DomainError) {
        match self {
            ActorMessage::Execute { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            ActorMessage::GetState { reply } => {
                let _ = reply.send(Err(error));
            }
        }
    }
}

/// One identity's registry entry.
///
/// An actor holds its identity's lease from before replay until it exits. A
/// replacement replays only after its predecessor has drained and let go.
struct Slot<A: Aggregate> {
    mailbox: Option<mpsc::Sender<ActorMessage<A>>>,
    lease: Arc<Mutex<()>>,
}

impl<A: Aggregate> Slot<A> {
    fn open_mailbox(&self) -> Option<&mpsc::Sender<ActorMessage<A>>> {
        self.mailbox.as_ref().filter(|tx| !tx.is_closed())
    }

    /// Nothing accepts or processes messages for this identity.
    fn is_vacant(&self) -> bool {
        self.open_mailbox().is_none() && Arc::strong_count(&self.lease) == 1
    }
}

struct HostShared<S: EventStore, A: Aggregate> {
    handler: CommandHandler<S, A>,
    hooks: Arc<dyn ActorHooks<A>>,
    actors: RwLock<HashMap<AggregateId, Slot<A>>>,
    config: HostConfig,
}

/// Routes messages to one actor per aggregate identity.
pub struct AggregateHost<S: EventStore, A: Aggregate> {
    shared: Arc<HostShared<S, A>>,
}

impl<S: EventStore, A: Aggregate> Clone for AggregateHost<S, A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A non-owning reference to a host, for hooks that route back into it.
pub struct WeakHost<S: EventStore, A: Aggregate> {
    shared: Weak<HostShared<S, A>>,
}

impl<S: EventStore, A: Aggregate> Clone for WeakHost<S, A> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<S: EventStore + 'static, A: Aggregate> WeakHost<S, A> {
    pub fn upgrade(&self) -> Option<AggregateHost<S, A>> {
        self.shared.upgrade().map(|shared| AggregateHost { shared })
    }
}

impl<S: EventStore + 'static, A: Aggregate> AggregateHost<S, A> {
    pub fn new(handler: CommandHandler<S, A>, config: HostConfig) -> Self {
        Self::with_hooks(handler, config, |_| Arc::new(NoHooks))
    }

    /// Creates a host whose hooks may hold a [`WeakHost`] back to it.
    pub fn with_hooks<F>(
        handler: CommandHandler<S, A>,
        config: HostConfig,
        make_hooks: F,
    ) -> Self
    where
        F: FnOnce(WeakHost<S, A>) -> Arc<dyn ActorHooks<A>>,
    {
        let shared = Arc::new_cyclic(|weak| HostShared {
            handler,
            hooks: make_hooks(WeakHost {
                shared: weak.clone(),
            }),
            actors: RwLock::new(HashMap::new()),
            config,
        });
        Self { shared }
    }

    pub fn handler(&self) -> &CommandHandler<S, A> {
        &self.shared.handler
    }

    pub fn downgrade(&self) -> WeakHost<S, A> {
        WeakHost {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Sends a command to the identity's actor and waits for the outcome.
    pub async fn send(
        &self,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<CommandResult<A>, DomainError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(aggregate_id, ActorMessage::Execute { command, reply })
            .await?;
        rx.await
            .map_err(|_| DomainError::ActorGone { aggregate_id })?
    }

    /// Returns a snapshot of the identity's current state.
    pub async fn state(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(aggregate_id, ActorMessage::GetState { reply })
            .await?;
        rx.await
            .map_err(|_| DomainError::ActorGone { aggregate_id })?
    }

    /// Makes sure the identity is loaded and its activation hook has run.
    pub async fn activate(&self, aggregate_id: AggregateId) -> Result<(), DomainError> {
        self.state(aggregate_id).await.map(|_| ())
    }

    /// Number of actors currently accepting messages.
    pub async fn live_count(&self) -> usize {
        self.shared
            .actors
            .read()
            .await
            .values()
            .filter(|slot| slot.open_mailbox().is_some())
            .count()
    }

    /// Drops every mailbox. Actors finish what is queued and exit.
    pub async fn shutdown(&self) {
        let mut actors = self.shared.actors.write().await;
        for slot in actors.values_mut() {
            slot.mailbox = None;
        }
        actors.retain(|_, slot| !slot.is_vacant());
    }

    async fn dispatch(
        &self,
        aggregate_id: AggregateId,
        message: ActorMessage<A>,
    ) -> Result<(), DomainError> {
        let tx = self.mailbox(aggregate_id).await;
        match tx.send(message).await {
            Ok(()) => Ok(()),
            // The actor deactivated between lookup and send.
            Err(mpsc::error::SendError(message)) => self
                .mailbox(aggregate_id)
                .await
                .send(message)
                .await
                .map_err(|_| DomainError::ActorGone { aggregate_id }),
        }
    }

    async fn mailbox(&self, aggregate_id: AggregateId) -> mpsc::Sender<ActorMessage<A>> {
        {
            let actors = self.shared.actors.read().await;
            if let Some(tx) = actors.get(&aggregate_id).and_then(Slot::open_mailbox) {
                return tx.clone();
            }
        }

        let mut actors = self.shared.actors.write().await;
        if let Some(tx) = actors.get(&aggregate_id).and_then(Slot::open_mailbox) {
            return tx.clone();
        }

        // A previous actor may still be draining; its successor shares the lease.
        let lease = actors
            .remove(&aggregate_id)
            .map(|slot| slot.lease)
            .unwrap_or_default();
        actors.retain(|_, slot| !slot.is_vacant());

        let (tx, rx) = mpsc::channel(self.shared.config.mailbox_capacity);
        tokio::spawn(run_actor(
            Arc::clone(&self.shared),
            aggregate_id,
            Arc::clone(&lease),
            rx,
        ));
        actors.insert(
            aggregate_id,
            Slot {
                mailbox: Some(tx.clone()),
                lease,
            },
        );
        tx
    }
}

async fn run_actor<S: EventStore + 'static, A: Aggregate>(
    shared: Arc<HostShared<S, A>>,
    aggregate_id: AggregateId,
    lease: Arc<Mutex<()>>,
    mut rx: mpsc::Receiver<ActorMessage<A>>,
) {
    let aggregate_type = A::aggregate_type();
    let idle_timeout = shared.config.idle_timeout;
    let _lease = lease.lock_owned().await;

    let mut halted: Option<String> = None;
    let mut state = match shared.handler.load(aggregate_id).await {
        Ok(state) => {
            tracing::debug!(
                aggregate_type,
                %aggregate_id,
                version = %state.version(),
                "actor activated"
            );
            shared.hooks.on_activate(aggregate_id, &state).await;
            state
        }
        Err(e) if e.is_fatal() => {
            tracing::error!(
                aggregate_type,
                %aggregate_id,
                error = %e,
                "replay failed, actor halted"
            );
            halted = Some(e.to_string());
            A::default()
        }
        Err(e) => {
            tracing::warn!(aggregate_type, %aggregate_id, error = %e, "actor failed to activate");
            let reason = e.to_string();
            rx.close();
            while let Some(message) = rx.recv().await {
                message.fail(DomainError::Activation {
                    aggregate_id,
                    reason: reason.clone(),
                });
            }
            return;
        }
    };

    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(message)) => {
                process(&shared, aggregate_id, &mut state, &mut halted, message).await;
            }
            Ok(None) => break,
            Err(_elapsed) => {
                tracing::debug!(aggregate_type, %aggregate_id, "actor idle, deactivating");
                rx.close();
                while let Some(message) = rx.recv().await {
                    process(&shared, aggregate_id, &mut state, &mut halted, message).await;
                }
                break;
            }
        }
    }
}

async fn process<S: EventStore + 'static, A: Aggregate>(
    shared: &HostShared<S, A>,
    aggregate_id: AggregateId,
    state: &mut A,
    halted: &mut Option<String>,
    message: ActorMessage<A>,
) {
    if let Some(reason) = halted.as_ref() {
        message.fail(DomainError::Halted {
            aggregate_id,
            reason: reason.clone(),
        });
        return;
    }

    match message {
        ActorMessage::Execute { command, reply } => {
            let result = execute(shared, aggregate_id, state, command).await;
            if let Err(e) = &result
                && e.is_fatal()
            {
                tracing::error!(
                    aggregate_type = A::aggregate_type(),
                    %aggregate_id,
                    error = %e,
                    "actor halted"
                );
                *halted = Some(e.to_string());
            }
            let _ = reply.send(result);
        }
        ActorMessage::GetState { reply } => {
            let _ = reply.send(Ok(state.clone()));
        }
    }
}

async fn execute<S: EventStore + 'static, A: Aggregate>(
    shared: &HostShared<S, A>,
    aggregate_id: AggregateId,
    state: &mut A,
    command: A::Command,
) -> Result<CommandResult<A>, DomainError> {
    let result = shared.handler.handle(state, aggregate_id, &command).await?;
    let published = shared.handler.publish(&result).await;

    if let (Some(event), Some(envelope)) = (result.event(), &result.envelope) {
        shared
            .hooks
            .on_event(aggregate_id, state, event, envelope)
            .await;
    }

    published.map(|()| result)
}
