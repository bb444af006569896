//! Append-only, per-aggregate event log.
//!
//! The log is the source of truth for every aggregate: state is rebuilt by
//! replaying [`EventEnvelope`]s in [`Version`] order. Two backends implement
//! [`EventStore`]: [`InMemoryEventStore`] for tests and single-process runs,
//! and [`PostgresEventStore`] for durable storage.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
