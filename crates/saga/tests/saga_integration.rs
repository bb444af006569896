//! Integration tests for saga coordination.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use channel::{InMemoryEventChannel, SubscriptionTable};
use common::AggregateId;
use domain::{CommandHandler, DomainError, HostConfig};
use event_store::{EventStore, InMemoryEventStore};
use saga::{
    CompleteTask, ConfirmChild, Reconcile, SagaConfig, SagaError, SagaService, SagaState,
    SaveOperation, TaskService,
};
use timer::{InMemoryReminderStore, ReminderHandle, TickReceiver, TimerService};

struct Harness {
    store: InMemoryEventStore,
    channel: InMemoryEventChannel,
    reminders: Arc<InMemoryReminderStore>,
    timer: TimerService,
    ticks: Option<TickReceiver>,
    sagas: SagaService<InMemoryEventStore>,
    tasks: TaskService<InMemoryEventStore>,
}

impl Harness {
    fn new(reconcile_interval: Duration) -> Self {
        Self::with_store(
            InMemoryEventStore::new(),
            Arc::new(InMemoryReminderStore::new()),
            reconcile_interval,
        )
    }

    fn with_store(
        store: InMemoryEventStore,
        reminders: Arc<InMemoryReminderStore>,
        reconcile_interval: Duration,
    ) -> Self {
        Self::with_stores(store.clone(), store, reminders, reconcile_interval)
    }

    /// Coordinators log to `store`, tasks to `task_store`.
    fn with_stores(
        store: InMemoryEventStore,
        task_store: InMemoryEventStore,
        reminders: Arc<InMemoryReminderStore>,
        reconcile_interval: Duration,
    ) -> Self {
        let channel = InMemoryEventChannel::new();
        let (timer, ticks) = TimerService::new(reminders.clone());
        let config = SagaConfig {
            reconcile_interval,
            host: HostConfig::default(),
        };

        let sagas = SagaService::new(
            CommandHandler::new(store.clone(), Arc::new(channel.clone())),
            timer.clone(),
            config,
        );
        let tasks = TaskService::new(
            CommandHandler::new(task_store, Arc::new(channel.clone())),
            HostConfig::default(),
        );

        Self {
            store,
            channel,
            reminders,
            timer,
            ticks: Some(ticks),
            sagas,
            tasks,
        }
    }

    /// Delivers reminder ticks to the coordinators from now on.
    fn run_timer(&mut self) {
        if let Some(ticks) = self.ticks.take() {
            ticks.dispatch(self.sagas.tick_sink());
        }
    }

    async fn complete(
        &self,
        task_id: AggregateId,
        saga_id: AggregateId,
        operation_id: AggregateId,
    ) {
        let result = self
            .tasks
            .complete_task(CompleteTask::new(task_id, saga_id, operation_id))
            .await
            .unwrap();
        assert!(result.envelope.is_some());
    }

    async fn wait_for<F>(&self, saga_id: AggregateId, done: F) -> SagaState
    where
        F: Fn(&SagaState) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                if let Ok(state) = self.sagas.status(saga_id).await {
                    state.check_invariants().unwrap();
                    if done(&state) {
                        return state;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("saga did not reach the expected state")
    }
}

fn ids<const N: usize>() -> [AggregateId; N] {
    std::array::from_fn(|_| AggregateId::new())
}

#[tokio::test]
async fn test_three_children_complete_on_the_tick_after_the_last_confirmation() {
    let h = Harness::new(Duration::from_secs(3600));
    let [saga_id, operation_id] = ids();
    let [a, b, c] = ids();

    let started = h
        .sagas
        .save_operation(SaveOperation::new(saga_id, operation_id, [a, b, c]))
        .await
        .unwrap();
    assert!(started.envelope.is_some());
    let state = h.sagas.status(saga_id).await.unwrap();
    assert_eq!(state.pending_child_ids, BTreeSet::from([a, b, c]));
    assert!(state.is_active && !state.is_completed);

    h.complete(b, saga_id, operation_id).await;
    h.complete(a, saga_id, operation_id).await;
    let state = h
        .wait_for(saga_id, |s| s.completed_child_ids.len() == 2)
        .await;
    assert_eq!(state.pending_child_ids, BTreeSet::from([c]));

    // A tick while C is pending changes nothing.
    let tick = h.sagas.reconcile(Reconcile::new(saga_id)).await.unwrap();
    assert!(tick.outcome.is_accepted());
    assert!(tick.envelope.is_none());
    assert!(!h.sagas.status(saga_id).await.unwrap().is_completed);

    h.complete(c, saga_id, operation_id).await;
    let state = h.wait_for(saga_id, |s| s.pending_child_ids.is_empty()).await;
    assert!(!state.is_completed);

    let tick = h.sagas.reconcile(Reconcile::new(saga_id)).await.unwrap();
    assert!(tick.envelope.is_some());
    let state = h.sagas.status(saga_id).await.unwrap();
    assert!(state.is_completed);
    assert_eq!(state.completed_child_ids, BTreeSet::from([a, b, c]));

    let handle = ReminderHandle::new(saga_id, saga::RECONCILE_REMINDER);
    assert!(!h.timer.is_armed(&handle).await);
    assert!(h.reminders.is_empty().await);

    // Ticks after completion are ignored.
    let late = h.sagas.reconcile(Reconcile::new(saga_id)).await.unwrap();
    assert!(late.envelope.is_none());
}

#[tokio::test]
async fn test_status_before_any_operation_is_not_initialized() {
    let h = Harness::new(Duration::from_secs(3600));
    let err = h.sagas.status(AggregateId::new()).await.unwrap_err();
    assert!(matches!(
        err,
        SagaError::Domain(DomainError::NotInitialized { .. })
    ));
}

#[tokio::test]
async fn test_confirming_a_stranger_is_rejected() {
    let h = Harness::new(Duration::from_secs(3600));
    let [saga_id, operation_id, child] = ids();
    h.sagas
        .save_operation(SaveOperation::new(saga_id, operation_id, [child]))
        .await
        .unwrap();

    let result = h
        .sagas
        .confirm_child(ConfirmChild::new(saga_id, AggregateId::new()))
        .await
        .unwrap();
    assert!(result.outcome.is_rejected());
    assert_eq!(
        h.sagas.status(saga_id).await.unwrap().pending_child_ids,
        BTreeSet::from([child])
    );
}

#[tokio::test]
async fn test_completion_for_another_saga_is_not_forwarded() {
    let h = Harness::new(Duration::from_secs(3600));
    let [saga_id, operation_id, child] = ids();
    h.sagas
        .save_operation(SaveOperation::new(saga_id, operation_id, [child]))
        .await
        .unwrap();

    h.complete(child, AggregateId::new(), AggregateId::new()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        h.sagas.status(saga_id).await.unwrap().pending_child_ids,
        BTreeSet::from([child])
    );
}

#[tokio::test(start_paused = true)]
async fn test_workers_and_timer_drive_the_saga_to_completion() {
    let mut h = Harness::new(Duration::from_secs(1));
    let workers = h
        .tasks
        .clone()
        .subscribe(SubscriptionTable::new())
        .spawn(&h.channel)
        .await
        .unwrap();
    h.run_timer();

    let [saga_id, operation_id] = ids();
    let children = ids::<4>();
    h.sagas
        .save_operation(SaveOperation::new(saga_id, operation_id, children))
        .await
        .unwrap();

    let state = h.wait_for(saga_id, |s| s.is_completed).await;
    assert_eq!(state.completed_child_ids.len(), 4);
    assert!(h.reminders.is_empty().await);

    for child in children {
        let task = h.tasks.task(child).await.unwrap();
        assert!(task.has_completed(saga_id, operation_id));
    }

    workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_restart_replays_and_resumes_pending_children() {
    let store = InMemoryEventStore::new();
    let reminders = Arc::new(InMemoryReminderStore::new());
    let [saga_id, operation_id] = ids();
    let [a, b] = ids();

    let before = {
        let h = Harness::with_store(store.clone(), reminders.clone(), Duration::from_secs(1));
        h.sagas
            .save_operation(SaveOperation::new(saga_id, operation_id, [a, b]))
            .await
            .unwrap();
        h.complete(a, saga_id, operation_id).await;
        let state = h.wait_for(saga_id, |s| s.completed_child_ids.len() == 1).await;
        h.timer.shutdown().await;
        h.sagas.host().shutdown().await;
        state
    };
    assert_eq!(reminders.len().await, 1);

    // A fresh process over the same log and reminder table.
    let mut h = Harness::with_store(store, reminders, Duration::from_secs(1));
    assert_eq!(h.timer.restore().await.unwrap(), 1);
    assert_eq!(h.sagas.status(saga_id).await.unwrap(), before);

    h.run_timer();
    h.complete(b, saga_id, operation_id).await;
    let state = h.wait_for(saga_id, |s| s.is_completed).await;
    assert_eq!(state.completed_child_ids, BTreeSet::from([a, b]));

    let versions = h.store.get_aggregate_version(saga_id).await.unwrap();
    assert_eq!(versions.map(|v| v.as_i64()), Some(4));
}

#[tokio::test]
async fn test_lost_child_requests_are_counted_but_the_operation_stands() {
    let h = Harness::new(Duration::from_secs(3600));
    let [saga_id, operation_id, child] = ids();

    h.channel.set_fail_publishes(true);
    let err = h
        .sagas
        .save_operation(SaveOperation::new(saga_id, operation_id, [child]))
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::Domain(DomainError::Channel(_))));
    h.channel.set_fail_publishes(false);

    // The operation was recorded and the coordinator still listens.
    let state = h.sagas.status(saga_id).await.unwrap();
    assert_eq!(state.pending_child_ids, BTreeSet::from([child]));

    h.complete(child, saga_id, operation_id).await;
    h.wait_for(saga_id, |s| s.pending_child_ids.is_empty()).await;
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_is_retried_after_a_failed_append() {
    let saga_store = InMemoryEventStore::new();
    let h = Harness::with_stores(
        saga_store.clone(),
        InMemoryEventStore::new(),
        Arc::new(InMemoryReminderStore::new()),
        Duration::from_secs(3600),
    );
    let [saga_id, operation_id, child] = ids();
    h.sagas
        .save_operation(SaveOperation::new(saga_id, operation_id, [child]))
        .await
        .unwrap();

    // The task completes on its own log while the coordinator cannot append.
    saga_store.set_fail_appends(true);
    h.complete(child, saga_id, operation_id).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        h.sagas.status(saga_id).await.unwrap().pending_child_ids,
        BTreeSet::from([child])
    );

    saga_store.set_fail_appends(false);
    let state = h.wait_for(saga_id, |s| s.pending_child_ids.is_empty()).await;
    assert_eq!(state.completed_child_ids, BTreeSet::from([child]));

    let tick = h.sagas.reconcile(Reconcile::new(saga_id)).await.unwrap();
    assert!(tick.envelope.is_some());
    assert!(h.sagas.status(saga_id).await.unwrap().is_completed);
}
