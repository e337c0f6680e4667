//! Error types specific to card transport

/// Transport error type
///
/// These describe failures to deliver a command or receive its reply. Card
/// rejections travel in the status word and are never transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "detail", rename_all = "snake_case"))]
pub enum TransportError {
    /// No card is connected
    #[error("The key is not connected")]
    NotConnected,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// The session closed while a command was in flight
    #[error("Card session closed")]
    SessionClosed,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Device or driver error with message
    #[error("Device error: {0}")]
    Device(String),
}

impl TransportError {
    /// Create a device error
    pub fn device<S: Into<String>>(message: S) -> Self {
        Self::Device(message.into())
    }
}
