//! Process host.
//!
//! [`Node::start`] wires one event store, one reminder store and an
//! in-process channel into the player, achievement and saga services, then
//! starts the namespace-wide subscriptions and the tick dispatcher.

pub mod config;
pub mod error;

use std::sync::Arc;

use channel::{EventChannel, InMemoryEventChannel, SubscriptionSet, SubscriptionTable};
use domain::{AchievementService, CommandHandler, HostConfig, PlayerService};
use event_store::EventStore;
use rules::{RuleEngine, default_rules};
use saga::{SagaConfig, SagaService, TaskService};
use timer::{ReminderStore, TimerService};
use tokio::task::JoinHandle;

pub use config::{Config, LogFormat};
pub use error::{NodeError, Result};

/// A running node.
pub struct Node<S: EventStore + Clone + 'static> {
    pub players: PlayerService<S>,
    pub achievements: AchievementService<S>,
    pub sagas: SagaService<S>,
    pub tasks: TaskService<S>,
    channel: InMemoryEventChannel,
    timer: TimerService,
    subscriptions: SubscriptionSet,
    ticks: JoinHandle<()>,
}

impl<S: EventStore + Clone + 'static> Node<S> {
    /// Builds every service and starts the background work.
    pub async fn start(
        store: S,
        reminders: Arc<dyn ReminderStore>,
        config: &Config,
    ) -> Result<Self> {
        let channel = InMemoryEventChannel::new();
        let shared: Arc<dyn EventChannel> = Arc::new(channel.clone());
        let host = HostConfig::default().with_idle_timeout(config.actor_idle_timeout);
        let (timer, ticks) = TimerService::new(reminders);

        let players = PlayerService::new(CommandHandler::new(store.clone(), shared.clone()), host);
        let achievements =
            AchievementService::new(CommandHandler::new(store.clone(), shared.clone()), host);
        let tasks = TaskService::new(CommandHandler::new(store.clone(), shared.clone()), host);
        let sagas = SagaService::new(
            CommandHandler::new(store.clone(), shared.clone()),
            timer.clone(),
            SagaConfig {
                reconcile_interval: config.reconcile_interval,
                host,
            },
        );
        let engine = RuleEngine::new(
            CommandHandler::new(store, shared),
            achievements.clone(),
            host,
        )
        .with_rules(default_rules());
        tracing::info!(rules = ?engine.rule_names(), "achievement rules loaded");

        let table = engine.subscribe(SubscriptionTable::new());
        let table = tasks.clone().subscribe(table);
        let subscriptions = table.spawn(&channel).await?;

        let ticks = ticks.dispatch(sagas.tick_sink());
        let restored = timer.restore().await?;
        tracing::info!(
            subscriptions = subscriptions.len(),
            restored_reminders = restored,
            "node started"
        );

        Ok(Self {
            players,
            achievements,
            sagas,
            tasks,
            channel,
            timer,
            subscriptions,
            ticks,
        })
    }

    pub fn channel(&self) -> &InMemoryEventChannel {
        &self.channel
    }

    pub fn timer(&self) -> &TimerService {
        &self.timer
    }

    /// Stops background work. Persisted reminders stay for the next start.
    pub async fn shutdown(self) {
        self.timer.shutdown().await;
        self.ticks.abort();
        self.subscriptions.shutdown();
        self.players.host().shutdown().await;
        self.achievements.host().shutdown().await;
        self.sagas.host().shutdown().await;
        self.tasks.host().shutdown().await;
        tracing::info!("node stopped");
    }
}
