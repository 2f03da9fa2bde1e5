//! Log client error types.

use thiserror::Error;

/// Errors returned by a log client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    /// Blocking read window elapsed without data
    #[error("i/o timeout")]
    Timeout,

    /// The caller's cancellation token fired while the call was in flight
    #[error("context canceled")]
    Canceled,

    /// Stream or consumer group does not exist
    #[error("No such stream or consumer group: {stream}/{group}")]
    NoGroup {
        /// Stream name
        stream: String,
        /// Group name
        group: String,
    },

    /// Consumer group already exists
    #[error("Consumer group already exists: {stream}/{group}")]
    GroupExists {
        /// Stream name
        stream: String,
        /// Group name
        group: String,
    },

    /// Message identifier is malformed or not monotonic
    #[error("Invalid message id: {0}")]
    InvalidId(String),

    /// Any other backend failure (connection, protocol, server error)
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Coarse classification of a [`LogError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No data within the block window
    Timeout,
    /// Call aborted by cancellation
    Canceled,
    /// Everything else
    Other,
}

impl LogError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LogError::Timeout => ErrorKind::Timeout,
            LogError::Canceled => ErrorKind::Canceled,
            _ => ErrorKind::Other,
        }
    }

    /// Timeouts and cancellations are expected during normal operation.
    pub fn is_benign(&self) -> bool {
        self.kind() != ErrorKind::Other
    }
}

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;
