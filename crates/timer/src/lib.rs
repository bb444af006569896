//! Durable timer.
//!
//! A [`Reminder`] is a named, periodic registration owned by an aggregate.
//! Registrations are persisted in a [`ReminderStore`] so they outlive the
//! process: after a restart [`TimerService::restore`] re-arms every stored
//! reminder. Ticks are handed to a [`TickSink`] through a [`TickReceiver`].

mod error;
mod reminder;
mod service;
mod store;

pub use common::AggregateId;
pub use error::{Result, TimerError};
pub use reminder::{Reminder, ReminderHandle, Tick};
pub use service::{TickReceiver, TickSink, TimerService};
pub use store::{InMemoryReminderStore, PostgresReminderStore, ReminderStore};
