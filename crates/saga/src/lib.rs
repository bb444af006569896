//! Timer-reconciled saga coordination.
//!
//! A [`SagaCoordinator`] fans one operation out to a set of child
//! [`SaveTask`]s and waits for each child to confirm on the channel. A
//! periodic reconcile reminder asks the coordinator whether anything is
//! still pending; the first tick that finds nothing pending completes the
//! operation.
//!
//! ```text
//! SaveOperation ──► OperationPending ──► ChildRequested ×N ──► SaveTask
//!                                                                 │
//!   OperationCompleted ◄── tick ◄── ChildCompleted ◄── TaskCompleted
//! ```

pub mod commands;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod service;
pub mod state;
pub mod task;

pub use commands::{ConfirmChild, Reconcile, SagaCommand, SaveOperation};
pub use coordinator::SagaCoordinator;
pub use error::{Result, SagaError};
pub use events::{
    CHILD_CONFIRMED_TOPIC, CHILD_REQUESTED_TOPIC, ChildRequested, SAGA_TOPIC, SagaEvent,
};
pub use service::{RECONCILE_REMINDER, SagaConfig, SagaService};
pub use state::{SagaState, SagaStatus};
pub use task::{CompleteTask, SaveTask, TaskEvent, TaskService};
