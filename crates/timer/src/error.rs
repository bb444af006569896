use thiserror::Error;

/// Errors raised by the timer service and reminder stores.
#[derive(Debug, Error)]
pub enum TimerError {
    /// Reminder periods must be positive.
    #[error("Invalid reminder period for {name}: must be greater than zero")]
    InvalidPeriod { name: String },

    /// A stored row could not be turned back into a reminder.
    #[error("Corrupt reminder row: {0}")]
    CorruptRow(String),

    /// The reminder store is unavailable.
    #[error("Reminder store unavailable: {0}")]
    Unavailable(String),

    /// The tick sink refused a tick.
    #[error("Tick delivery failed: {0}")]
    Sink(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for timer operations.
pub type Result<T> = std::result::Result<T, TimerError>;
