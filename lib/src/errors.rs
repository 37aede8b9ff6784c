use thiserror::Error;

/// Errors raised by the control and data channel transports.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not connected to a receiver")]
    NotConnected,

    #[error("Connection closed (from receiver side)")]
    Closed,

    #[error("Communication timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Background task failed to join: {0}")]
    Join(String),
}

/// Raised when a message cannot be encoded.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Message length {length} exceeds the allowed maximum")]
    LengthOverflow { length: usize },
}

/// Raised when received bytes are not a well-formed message.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated message: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Undefined control item code: 0x{0:04X}")]
    UnknownItemCode(u16),

    #[error("Body length mismatch: header declares {expected} bytes, got {actual}")]
    BodyLengthMismatch { expected: i32, actual: usize },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SampleError {
    #[error("Sample size must be between 8 and 32 bits, got {0}")]
    InvalidSampleSize(u16),
}

/// Errors surfaced by [`crate::session::NetSdrClient`] commands.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Another request is already pending")]
    ConcurrencyConflict,

    #[error("Timeout waiting for a response")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(#[from] NetworkError),

    #[error("Request aborted before a response arrived")]
    Aborted,
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed with config parsing: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}
