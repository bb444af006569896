//! Start-up errors.

use channel::ChannelError;
use event_store::EventStoreError;
use thiserror::Error;
use timer::TimerError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    #[error("Metrics exporter error: {0}")]
    Metrics(String),

    #[error("Logging setup error: {0}")]
    Logging(String),

    #[error("Signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;
