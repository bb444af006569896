use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{Reminder, ReminderHandle, ReminderStore, Result, Tick, TimerError};

/// Receives ticks from the timer service.
#[async_trait]
pub trait TickSink: Send + Sync {
    async fn deliver(&self, tick: Tick) -> Result<()>;
}

struct Armed {
    generation: u64,
    task: JoinHandle<()>,
}

struct ArmedTick {
    tick: Tick,
    generation: u64,
}

type ArmedMap = Arc<Mutex<HashMap<ReminderHandle, Armed>>>;

/// Arms persisted reminders as tokio tasks and emits their ticks.
///
/// Ticks are queued to the paired [`TickReceiver`]. A tick is only handed
/// out while the registration that produced it is still armed, so nothing
/// is delivered for a reminder once `cancel` has returned.
#[derive(Clone)]
pub struct TimerService {
    store: Arc<dyn ReminderStore>,
    armed: ArmedMap,
    ticks: mpsc::UnboundedSender<ArmedTick>,
    generations: Arc<AtomicU64>,
}

impl TimerService {
    /// Creates the service and the receiving end for its ticks.
    pub fn new(store: Arc<dyn ReminderStore>) -> (Self, TickReceiver) {
        let (ticks, receiver) = mpsc::unbounded_channel();
        let armed: ArmedMap = Arc::default();
        let service = Self {
            store,
            armed: armed.clone(),
            ticks,
            generations: Arc::new(AtomicU64::new(0)),
        };
        (service, TickReceiver { receiver, armed })
    }

    /// Persists and arms a reminder, replacing any registration with the same
    /// owner and name.
    pub async fn schedule(&self, reminder: Reminder) -> Result<ReminderHandle> {
        if reminder.period.is_zero() {
            return Err(TimerError::InvalidPeriod {
                name: reminder.name,
            });
        }

        self.store.save(&reminder).await?;
        let handle = reminder.handle();
        tracing::info!(
            reminder = %handle,
            period_ms = reminder.period.as_millis() as u64,
            "reminder scheduled"
        );
        self.arm(reminder).await;
        Ok(handle)
    }

    /// Disarms and forgets a reminder. Cancelling an unknown or already
    /// cancelled reminder succeeds.
    pub async fn cancel(&self, handle: &ReminderHandle) -> Result<()> {
        if let Some(armed) = self.armed.lock().await.remove(handle) {
            armed.task.abort();
        }
        let existed = self.store.remove(handle).await?;
        tracing::info!(reminder = %handle, existed, "reminder cancelled");
        Ok(())
    }

    /// Re-arms every stored reminder that is not already armed.
    ///
    /// Returns how many were armed.
    pub async fn restore(&self) -> Result<usize> {
        let reminders = self.store.load_all().await?;
        let mut restored = 0;
        for reminder in reminders {
            if self.is_armed(&reminder.handle()).await {
                continue;
            }
            self.arm(reminder).await;
            restored += 1;
        }
        tracing::info!(restored, "reminders restored");
        Ok(restored)
    }

    pub async fn is_armed(&self, handle: &ReminderHandle) -> bool {
        self.armed.lock().await.contains_key(handle)
    }

    /// Stops every armed reminder without touching the store.
    pub async fn shutdown(&self) {
        for (_, armed) in self.armed.lock().await.drain() {
            armed.task.abort();
        }
    }

    async fn arm(&self, reminder: Reminder) {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst);
        let handle = reminder.handle();
        let sender = self.ticks.clone();

        let mut armed = self.armed.lock().await;
        let task = tokio::spawn(run_reminder(reminder, generation, sender));
        if let Some(previous) = armed.insert(handle, Armed { generation, task }) {
            previous.task.abort();
        }
    }
}

async fn run_reminder(
    reminder: Reminder,
    generation: u64,
    sender: mpsc::UnboundedSender<ArmedTick>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + reminder.due, reminder.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let tick = Tick {
            name: reminder.name.clone(),
            owner: reminder.owner,
            fired_at: Utc::now(),
        };
        if sender.send(ArmedTick { tick, generation }).is_err() {
            break;
        }
    }
}

/// Receiving end of a [`TimerService`].
pub struct TickReceiver {
    receiver: mpsc::UnboundedReceiver<ArmedTick>,
    armed: ArmedMap,
}

impl TickReceiver {
    /// Waits for the next tick of a still-armed reminder.
    pub async fn recv(&mut self) -> Option<Tick> {
        while let Some(ArmedTick { tick, generation }) = self.receiver.recv().await {
            let live = self
                .armed
                .lock()
                .await
                .get(&tick.handle())
                .is_some_and(|armed| armed.generation == generation);
            if live {
                return Some(tick);
            }
            tracing::debug!(reminder = %tick.handle(), "dropping tick of disarmed reminder");
        }
        None
    }

    /// Forwards every tick to `sink`, one at a time, on a background task.
    pub fn dispatch(mut self, sink: Arc<dyn TickSink>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(tick) = self.recv().await {
                metrics::counter!("timer_ticks_total").increment(1);
                let handle = tick.handle();
                if let Err(e) = sink.deliver(tick).await {
                    tracing::warn!(reminder = %handle, error = %e, "tick delivery failed");
                }
            }
        })
    }
}
