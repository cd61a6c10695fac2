//! Error types for APDU handling and transport.

use thiserror::Error;

use crate::status::StatusWord;

/// Result type for APDU operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for APDU handling and transport.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying transport failed to exchange the APDU.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response could not be parsed.
    #[error("failed to parse response: {0}")]
    Parse(&'static str),

    /// The card returned an error status word.
    #[error("card returned error status: {0}")]
    Status(StatusWord),

    /// Other error with a dynamic message.
    #[error("{0}")]
    Message(String),

    /// Other error with a static message.
    #[error("{0}")]
    Other(&'static str),
}

impl Error {
    /// Create a transport error from any displayable cause.
    pub fn transport<E: std::fmt::Display>(cause: E) -> Self {
        Self::Transport(cause.to_string())
    }

    /// Create an error with a dynamic message.
    pub fn message<S: Into<String>>(message: S) -> Self {
        Self::Message(message.into())
    }

    /// Create an error with a static message.
    pub const fn other(message: &'static str) -> Self {
        Self::Other(message)
    }
}
