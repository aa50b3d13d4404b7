//! Error types for the publisher.

use thiserror::Error;

/// Result type alias using [`PublisherError`].
pub type Result<T> = std::result::Result<T, PublisherError>;

/// Errors that can occur while configuring or running the publisher.
#[derive(Error, Debug)]
pub enum PublisherError {
    /// Configuration rejected before any state change.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The local UDP port could not be bound.
    #[error("Failed to bind UDP socket to {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    /// A datagram could not be sent.
    #[error("Failed to send frame to {destination}: {message}")]
    SendFailed {
        destination: String,
        message: String,
    },

    /// Operation requires a running publisher.
    #[error("Publisher is not running")]
    NotRunning,

    /// Frame encoding or decoding error.
    #[error(transparent)]
    Frame(#[from] sensorcast_common::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PublisherError {
    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a bind failure.
    pub fn bind_failed(addr: impl ToString, reason: impl ToString) -> Self {
        Self::BindFailed {
            addr: addr.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a send failure.
    pub fn send_failed(destination: impl ToString, message: impl ToString) -> Self {
        Self::SendFailed {
            destination: destination.to_string(),
            message: message.to_string(),
        }
    }

    /// Wrap an error with context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether the publisher keeps ticking after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SendFailed { .. }
                | Self::Frame(sensorcast_common::Error::EncodeTooLarge { .. })
        )
    }
}

impl From<serde_json::Error> for PublisherError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_context("Serialization error", err)
    }
}
