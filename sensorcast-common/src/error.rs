use thiserror::Error;

/// Common error type for SensorCast components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoded frame is {size} bytes, exceeding the {limit} byte datagram limit")]
    EncodeTooLarge { size: usize, limit: usize },

    #[error("Unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    #[error("Malformed frame: {0}")]
    Malformed(String),
}

impl Error {
    /// Create a malformed-frame error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// Result type alias using SensorCast's Error.
pub type Result<T> = std::result::Result<T, Error>;
