//! Shared identity types for the aggregate workspace.

mod types;

pub use types::{AggregateId, ParseAggregateIdError};
