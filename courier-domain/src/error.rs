//! Domain error types.

use thiserror::Error;

/// Errors raised while decoding, validating or mutating domain events.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Payload is not a well-formed event document
    #[error("Malformed event document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Document declares a spec version we do not understand
    #[error("Unsupported spec version: {0}")]
    UnsupportedSpecVersion(String),

    /// A required attribute is present but empty
    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),

    /// Extension attribute name does not follow the naming rules
    #[error("Invalid extension name {name:?}: {reason}")]
    InvalidExtensionName {
        /// Offending name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
