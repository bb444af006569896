//! Saga lifecycle.

use std::collections::BTreeSet;

use common::AggregateId;
use serde::{Deserialize, Serialize};

/// Where a saga coordinator is in its single fan-out/fan-in cycle.
///
/// State transitions:
/// ```text
/// Idle ──SaveOperation──► Active ──tick, nothing pending──► Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaStatus {
    /// No operation has been requested.
    #[default]
    Idle,

    /// Children have been requested and some may still be pending.
    Active,

    /// Every child confirmed and a reconcile tick observed it (terminal state).
    Completed,
}

impl SagaStatus {
    /// Returns true if an operation can be started.
    pub fn can_start(&self) -> bool {
        matches!(self, SagaStatus::Idle)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Idle => "Idle",
            SagaStatus::Active => "Active",
            SagaStatus::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read model of a coordinator, as returned by the status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaState {
    pub pending_operation_id: Option<AggregateId>,
    pub pending_child_ids: BTreeSet<AggregateId>,
    pub completed_child_ids: BTreeSet<AggregateId>,
    pub is_active: bool,
    pub is_completed: bool,
}

impl SagaState {
    /// Checks the invariants every coordinator state must satisfy.
    pub fn check_invariants(&self) -> Result<(), String> {
        if let Some(id) = self.pending_child_ids.intersection(&self.completed_child_ids).next() {
            return Err(format!("child {id} is both pending and completed"));
        }
        if self.is_completed && !self.pending_child_ids.is_empty() {
            return Err(format!(
                "completed with {} children still pending",
                self.pending_child_ids.len()
            ));
        }
        if self.is_completed && !self.is_active {
            return Err("completed but never active".to_string());
        }
        if self.is_active != self.pending_operation_id.is_some() {
            return Err("active flag and operation id disagree".to_string());
        }
        Ok(())
    }
}
