use thiserror::Error;

/// Errors raised by a pub/sub transport.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The transport refused the message or the subscription.
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    /// The channel has been shut down.
    #[error("Channel closed")]
    Closed,
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Failure reported by a subscription handler for a single delivery.
///
/// The dispatcher logs it and moves on to the next message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}
