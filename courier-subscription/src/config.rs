//! Subscription configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

use courier_log::{ReadGroupRequest, StartId};

use crate::error::{SubscriptionError, SubscriptionResult};

/// Default block window for a group read.
///
/// Long enough that a read effectively waits for data or cancellation.
pub const DEFAULT_BLOCK: Duration = Duration::from_secs(3600);

// =============================================================================
// Configuration
// =============================================================================

/// Configuration of a single subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Subscription name (used in logs)
    pub name: String,
    /// Log stream to consume
    pub stream: String,
    /// Consumer group
    pub group: String,
    /// Consumer instance name; selects which backlog a read drains
    pub consumer: String,
    /// Block window of each read
    pub block: Duration,
    /// Upper bound on concurrent dispatch tasks (`None` = unbounded)
    pub max_in_flight: Option<usize>,
}

impl SubscriptionConfig {
    /// Create a configuration with default consumer name and block window.
    pub fn new(
        name: impl Into<String>,
        stream: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            stream: stream.into(),
            group: group.into(),
            consumer: default_consumer(),
            block: DEFAULT_BLOCK,
            max_in_flight: None,
        }
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            name: "test".to_string(),
            stream: "test-stream".to_string(),
            group: "test-group".to_string(),
            consumer: "test-consumer".to_string(),
            block: Duration::from_secs(5),
            max_in_flight: None,
        }
    }

    /// Set consumer instance name
    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    /// Set block window
    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    /// Bound concurrent dispatch tasks
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = Some(max);
        self
    }

    /// Load configuration from environment variables.
    ///
    /// - `COURIER_STREAM`: stream to consume (required)
    /// - `COURIER_GROUP`: consumer group (required)
    /// - `COURIER_SUBSCRIPTION`: subscription name (default: group)
    /// - `COURIER_CONSUMER`: consumer name (default: courier-<pid>)
    /// - `COURIER_BLOCK_MS`: block window (default: 3600000)
    /// - `COURIER_MAX_IN_FLIGHT`: dispatch bound (default: unbounded)
    pub fn from_env() -> SubscriptionResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let stream = Self::require_env("COURIER_STREAM")?;
        let group = Self::require_env("COURIER_GROUP")?;
        let name = env::var("COURIER_SUBSCRIPTION").unwrap_or_else(|_| group.clone());
        let consumer = env::var("COURIER_CONSUMER").unwrap_or_else(|_| default_consumer());

        let block = match Self::load_u64_env("COURIER_BLOCK_MS")? {
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_BLOCK,
        };
        let max_in_flight = Self::load_u64_env("COURIER_MAX_IN_FLIGHT")?
            .map(|n| {
                usize::try_from(n).map_err(|_| {
                    SubscriptionError::Config(format!("Invalid COURIER_MAX_IN_FLIGHT value: {}", n))
                })
            })
            .transpose()?;

        let config = Self { name, stream, group, consumer, block, max_in_flight };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Identity fields must be non-empty and a dispatch bound, if set, must
    /// be at least one.
    pub fn validate(&self) -> SubscriptionResult<()> {
        for (field, value) in [
            ("name", &self.name),
            ("stream", &self.stream),
            ("group", &self.group),
            ("consumer", &self.consumer),
        ] {
            if value.is_empty() {
                return Err(SubscriptionError::Config(format!("{} must not be empty", field)));
            }
        }

        if self.max_in_flight == Some(0) {
            return Err(SubscriptionError::Config(
                "max_in_flight must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the single-message group read for the given cursor.
    pub fn read_request(&self, start: StartId) -> ReadGroupRequest {
        ReadGroupRequest::new(&self.stream, &self.group, &self.consumer, start)
            .with_count(1)
            .with_block(self.block)
    }

    fn require_env(key: &str) -> SubscriptionResult<String> {
        match env::var(key) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Err(SubscriptionError::Config(format!("{} is not set", key))),
        }
    }

    fn load_u64_env(key: &str) -> SubscriptionResult<Option<u64>> {
        match env::var(key) {
            Ok(val) => val
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| SubscriptionError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(None),
        }
    }
}

fn default_consumer() -> String {
    format!("courier-{}", std::process::id())
}

// =============================================================================
// Tests
// =============================================================================
