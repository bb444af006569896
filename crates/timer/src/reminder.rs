use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::AggregateId;

/// Identifies a reminder registration: one per `(owner, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReminderHandle {
    pub owner: AggregateId,
    pub name: String,
}

impl ReminderHandle {
    pub fn new(owner: AggregateId, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ReminderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A periodic, persistent registration.
///
/// The first tick fires `due` after arming, then every `period`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub owner: AggregateId,
    pub name: String,
    pub due: Duration,
    pub period: Duration,
}

impl Reminder {
    pub fn new(
        owner: AggregateId,
        name: impl Into<String>,
        due: Duration,
        period: Duration,
    ) -> Self {
        Self {
            owner,
            name: name.into(),
            due,
            period,
        }
    }

    /// A reminder whose first tick comes one period after arming.
    pub fn every(owner: AggregateId, name: impl Into<String>, period: Duration) -> Self {
        Self::new(owner, name, period, period)
    }

    pub fn handle(&self) -> ReminderHandle {
        ReminderHandle::new(self.owner, self.name.clone())
    }
}

/// A single firing of a reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub name: String,
    pub owner: AggregateId,
    pub fired_at: DateTime<Utc>,
}

impl Tick {
    pub fn handle(&self) -> ReminderHandle {
        ReminderHandle::new(self.owner, self.name.clone())
    }
}
