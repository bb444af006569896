use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{AggregateId, Reminder, ReminderHandle, Result, TimerError};

/// Persistence for reminder registrations.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Inserts or replaces the registration for `(owner, name)`.
    async fn save(&self, reminder: &Reminder) -> Result<()>;

    /// Removes a registration. Returns whether one existed.
    async fn remove(&self, handle: &ReminderHandle) -> Result<bool>;

    /// Every live registration.
    async fn load_all(&self) -> Result<Vec<Reminder>>;
}

/// Reminder store kept in process memory.
///
/// Clones share state, so a clone handed to a fresh `TimerService` plays the
/// part of the durable store across a simulated restart.
#[derive(Clone, Default)]
pub struct InMemoryReminderStore {
    reminders: Arc<RwLock<HashMap<ReminderHandle, Reminder>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryReminderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.reminders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.reminders.read().await.is_empty()
    }

    pub async fn contains(&self, handle: &ReminderHandle) -> bool {
        self.reminders.read().await.contains_key(handle)
    }

    /// Makes every subsequent operation fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TimerError::Unavailable(
                "in-memory reminder store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn save(&self, reminder: &Reminder) -> Result<()> {
        self.check()?;
        self.reminders
            .write()
            .await
            .insert(reminder.handle(), reminder.clone());
        Ok(())
    }

    async fn remove(&self, handle: &ReminderHandle) -> Result<bool> {
        self.check()?;
        Ok(self.reminders.write().await.remove(handle).is_some())
    }

    async fn load_all(&self) -> Result<Vec<Reminder>> {
        self.check()?;
        Ok(self.reminders.read().await.values().cloned().collect())
    }
}

/// Reminder store backed by the `reminders` table.
#[derive(Clone)]
pub struct PostgresReminderStore {
    pool: PgPool,
}

impl PostgresReminderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_reminder(row: PgRow) -> Result<Reminder> {
        let name: String = row.try_get("name")?;
        let due_ms: i64 = row.try_get("due_time_ms")?;
        let period_ms: i64 = row.try_get("period_ms")?;
        let (Ok(due_ms), Ok(period_ms)) = (u64::try_from(due_ms), u64::try_from(period_ms)) else {
            return Err(TimerError::CorruptRow(format!(
                "negative duration on reminder {name}"
            )));
        };

        Ok(Reminder {
            owner: AggregateId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            name,
            due: Duration::from_millis(due_ms),
            period: Duration::from_millis(period_ms),
        })
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl ReminderStore for PostgresReminderStore {
    async fn save(&self, reminder: &Reminder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reminders (owner_id, name, due_time_ms, period_ms, registered_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (owner_id, name) DO UPDATE SET
                due_time_ms = EXCLUDED.due_time_ms,
                period_ms = EXCLUDED.period_ms,
                registered_at = EXCLUDED.registered_at
            "#,
        )
        .bind(reminder.owner.as_uuid())
        .bind(&reminder.name)
        .bind(millis(reminder.due))
        .bind(millis(reminder.period))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, handle: &ReminderHandle) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reminders WHERE owner_id = $1 AND name = $2")
            .bind(handle.owner.as_uuid())
            .bind(&handle.name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_all(&self) -> Result<Vec<Reminder>> {
        let rows = sqlx::query(
            r#"
            SELECT owner_id, name, due_time_ms, period_ms
            FROM reminders
            ORDER BY registered_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reminder).collect()
    }
}
