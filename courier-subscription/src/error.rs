//! Subscription error types.

use thiserror::Error;

/// Errors raised while setting up a subscription.
///
/// Nothing in the run loop is fatal; read, decode and acknowledge failures
/// are logged there and never surface as this type.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for subscription operations.
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;
