//! Log message and cursor types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::LogError;

/// Payload of a log message: field name to opaque value.
pub type Fields = BTreeMap<String, String>;

// =============================================================================
// MessageId
// =============================================================================

/// Position of a single entry in a stream.
///
/// Totally ordered: first by milliseconds, then by sequence within the
/// same millisecond. Rendered as `"<millis>-<seq>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MessageId {
    millis: u64,
    seq: u64,
}

impl MessageId {
    /// The smallest identifier; reading after it returns the whole backlog.
    pub const ZERO: MessageId = MessageId { millis: 0, seq: 0 };

    /// Create an identifier from its parts.
    pub const fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// Milliseconds part
    pub fn millis(&self) -> u64 {
        self.millis
    }

    /// Sequence part
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Next identifier after `self` given the current wall clock.
    ///
    /// Uses `now_millis` when the clock moved forward, otherwise bumps the
    /// sequence so identifiers stay strictly increasing.
    pub fn next(&self, now_millis: u64) -> Self {
        if now_millis > self.millis {
            Self::new(now_millis, 0)
        } else {
            Self::new(self.millis, self.seq + 1)
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for MessageId {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LogError::InvalidId(s.to_string());

        let (millis, seq) = match s.split_once('-') {
            Some((millis, seq)) => (millis, seq),
            None => (s, "0"),
        };

        let millis = millis.parse::<u64>().map_err(|_| invalid())?;
        let seq = seq.parse::<u64>().map_err(|_| invalid())?;

        Ok(Self::new(millis, seq))
    }
}

// =============================================================================
// StartId
// =============================================================================

/// Where a group read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartId {
    /// Entries already delivered to this consumer but not acknowledged,
    /// strictly after the given position
    After(MessageId),
    /// Entries never delivered to any consumer of the group (`">"`)
    NewOnly,
}

impl StartId {
    /// Start of the consumer's backlog.
    pub fn backlog() -> Self {
        StartId::After(MessageId::ZERO)
    }

    /// True while reading the consumer's backlog.
    pub fn is_backlog(&self) -> bool {
        matches!(self, StartId::After(_))
    }
}

impl fmt::Display for StartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartId::After(id) => write!(f, "{}", id),
            StartId::NewOnly => write!(f, ">"),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// A single log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Position in the stream; also the acknowledge key
    pub id: MessageId,
    /// Payload fields
    pub fields: Fields,
}

impl Message {
    /// Create a message
    pub fn new(id: MessageId, fields: Fields) -> Self {
        Self { id, fields }
    }
}

/// Messages returned for one stream by a group read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessages {
    /// Stream name
    pub stream: String,
    /// Messages in log order
    pub messages: Vec<Message>,
}

// =============================================================================
// ReadGroupRequest
// =============================================================================

/// Arguments of a blocking group read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadGroupRequest {
    /// Stream to read
    pub stream: String,
    /// Consumer group
    pub group: String,
    /// Consumer instance within the group
    pub consumer: String,
    /// Read cursor
    pub start: StartId,
    /// Maximum number of messages to return
    pub count: usize,
    /// How long to wait for new data. `None` returns at once; `Some(ZERO)`
    /// waits indefinitely.
    pub block: Option<Duration>,
    /// Skip pending-entry tracking for delivered messages
    pub no_ack: bool,
}

impl ReadGroupRequest {
    /// Create a request for a single message that does not wait for new data.
    pub fn new(
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
        start: StartId,
    ) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            start,
            count: 1,
            block: None,
            no_ack: false,
        }
    }

    /// Wait up to `block` for new data; zero waits indefinitely
    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = Some(block);
        self
    }

    /// Set the maximum message count
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
