//! In-memory log implementation
//!
//! Used for testing and development without an external broker.
//! Thread-safe using a Mutex for state and a Notify to wake blocked readers.
//!
//! Semantics follow a stream-with-consumer-groups log:
//! - every group tracks the last id it delivered and a pending-entries list
//! - `StartId::NewOnly` delivers past the last delivered id and records the
//!   entries as pending for the reading consumer
//! - `StartId::After(id)` replays the consumer's own pending entries after `id`
//! - `ack` removes an entry from the group's pending list

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{LogError, LogResult};
use crate::ports::LogClient;
use crate::types::{Fields, Message, MessageId, ReadGroupRequest, StartId, StreamMessages};

/// Where a newly created consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStart {
    /// Deliver every entry already in the stream
    Beginning,
    /// Deliver only entries appended after creation
    Latest,
}

/// An entry delivered to a consumer but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Consumer that owns the entry
    pub consumer: String,
    /// How many times the entry has been delivered
    pub delivery_count: u64,
}

#[derive(Default)]
struct LogState {
    streams: HashMap<String, StreamState>,
}

#[derive(Default)]
struct StreamState {
    entries: BTreeMap<MessageId, Fields>,
    last_id: MessageId,
    groups: HashMap<String, GroupState>,
}

struct GroupState {
    last_delivered: MessageId,
    pending: BTreeMap<MessageId, PendingEntry>,
}

/// In-memory group-partitioned append log.
pub struct MemoryLog {
    state: Mutex<LogState>,
    /// Woken on every append
    appended: Notify,
    read_calls: AtomicU64,
    ack_calls: AtomicU64,
    fail_next_read: Mutex<Option<LogError>>,
    fail_next_ack: Mutex<Option<LogError>>,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLog {
    /// Create a new empty log
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            appended: Notify::new(),
            read_calls: AtomicU64::new(0),
            ack_calls: AtomicU64::new(0),
            fail_next_read: Mutex::new(None),
            fail_next_ack: Mutex::new(None),
        }
    }

    /// Create a consumer group on a stream.
    ///
    /// With `mkstream` the stream is created when missing.
    pub fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
        mkstream: bool,
    ) -> LogResult<()> {
        let mut state = lock(&self.state);

        if !state.streams.contains_key(stream) {
            if !mkstream {
                return Err(no_group(stream, group));
            }
            state.streams.insert(stream.to_string(), StreamState::default());
        }

        let stream_state = state
            .streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;

        if stream_state.groups.contains_key(group) {
            return Err(LogError::GroupExists {
                stream: stream.to_string(),
                group: group.to_string(),
            });
        }

        let last_delivered = match start {
            GroupStart::Beginning => MessageId::ZERO,
            GroupStart::Latest => stream_state.last_id,
        };

        stream_state.groups.insert(
            group.to_string(),
            GroupState { last_delivered, pending: BTreeMap::new() },
        );

        debug!(stream, group, %last_delivered, "Consumer group created");
        Ok(())
    }

    /// Append an entry with an auto-generated id.
    pub fn append(&self, stream: &str, fields: Fields) -> LogResult<MessageId> {
        let id = {
            let mut state = lock(&self.state);
            let stream_state = state.streams.entry(stream.to_string()).or_default();

            let id = stream_state.last_id.next(now_millis());
            stream_state.entries.insert(id, fields);
            stream_state.last_id = id;
            id
        };

        self.appended.notify_waiters();
        Ok(id)
    }

    /// Append an entry with an explicit id.
    ///
    /// # Errors
    /// Returns `LogError::InvalidId` unless `id` is greater than both zero
    /// and the stream's last id.
    pub fn append_with_id(&self, stream: &str, id: MessageId, fields: Fields) -> LogResult<()> {
        {
            let mut state = lock(&self.state);
            let stream_state = state.streams.entry(stream.to_string()).or_default();

            if id == MessageId::ZERO || id <= stream_state.last_id {
                return Err(LogError::InvalidId(format!(
                    "{} is not greater than the last id {}",
                    id, stream_state.last_id
                )));
            }

            stream_state.entries.insert(id, fields);
            stream_state.last_id = id;
        }

        self.appended.notify_waiters();
        Ok(())
    }

    /// Number of entries in a stream
    pub fn len(&self, stream: &str) -> usize {
        lock(&self.state).streams.get(stream).map_or(0, |s| s.entries.len())
    }

    /// Check if a stream is empty or missing
    pub fn is_empty(&self, stream: &str) -> bool {
        self.len(stream) == 0
    }

    /// Pending entries of a group, in id order.
    pub fn pending(&self, stream: &str, group: &str) -> Vec<(MessageId, PendingEntry)> {
        lock(&self.state)
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.iter().map(|(id, entry)| (*id, entry.clone())).collect())
            .unwrap_or_default()
    }

    /// Number of pending entries of a group
    pub fn pending_count(&self, stream: &str, group: &str) -> usize {
        lock(&self.state)
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Number of `read_group` calls issued so far
    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Number of `ack` calls issued so far
    pub fn ack_calls(&self) -> u64 {
        self.ack_calls.load(Ordering::SeqCst)
    }

    /// Make the next `read_group` call fail with `error`.
    pub fn fail_next_read(&self, error: LogError) {
        *lock(&self.fail_next_read) = Some(error);
    }

    /// Make the next `ack` call fail with `error`.
    pub fn fail_next_ack(&self, error: LogError) {
        *lock(&self.fail_next_ack) = Some(error);
    }
}

impl LogState {
    fn read(&mut self, request: &ReadGroupRequest) -> LogResult<Vec<Message>> {
        let StreamState { entries, groups, .. } = self
            .streams
            .get_mut(&request.stream)
            .ok_or_else(|| no_group(&request.stream, &request.group))?;

        let group = groups
            .get_mut(&request.group)
            .ok_or_else(|| no_group(&request.stream, &request.group))?;

        let limit = if request.count == 0 { usize::MAX } else { request.count };

        match request.start {
            StartId::After(after) => {
                let mut messages = Vec::new();
                for (id, entry) in group.pending.range_mut((Excluded(after), Unbounded)) {
                    if messages.len() == limit {
                        break;
                    }
                    if entry.consumer != request.consumer {
                        continue;
                    }
                    entry.delivery_count += 1;
                    // Deleted entries come back with an empty payload
                    let fields = entries.get(id).cloned().unwrap_or_default();
                    messages.push(Message::new(*id, fields));
                }
                Ok(messages)
            }
            StartId::NewOnly => {
                let messages: Vec<Message> = entries
                    .range((Excluded(group.last_delivered), Unbounded))
                    .take(limit)
                    .map(|(id, fields)| Message::new(*id, fields.clone()))
                    .collect();

                if let Some(last) = messages.last() {
                    group.last_delivered = last.id;
                }

                if !request.no_ack {
                    for message in &messages {
                        group.pending.insert(
                            message.id,
                            PendingEntry { consumer: request.consumer.clone(), delivery_count: 1 },
                        );
                    }
                }

                Ok(messages)
            }
        }
    }
}

#[async_trait]
impl LogClient for MemoryLog {
    async fn read_group(
        &self,
        request: &ReadGroupRequest,
        cancel: &CancellationToken,
    ) -> LogResult<Vec<StreamMessages>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);

        if cancel.is_cancelled() {
            return Err(LogError::Canceled);
        }
        if let Some(error) = lock(&self.fail_next_read).take() {
            return Err(error);
        }

        let deadline = match request.block {
            Some(block) if block.is_zero() => None,
            Some(block) => Some(Instant::now() + block),
            None => None,
        };

        loop {
            // Register interest before looking at the state so an append
            // between the check and the wait is not missed.
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = lock(&self.state);
                let messages = state.read(request)?;

                // Backlog reads never block
                if !messages.is_empty() || request.start.is_backlog() || request.block.is_none() {
                    return Ok(vec![StreamMessages { stream: request.stream.clone(), messages }]);
                }
            }

            let expired = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(LogError::Canceled),
                _ = expired => return Err(LogError::Timeout),
                _ = &mut notified => {}
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, id: &MessageId) -> LogResult<()> {
        self.ack_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = lock(&self.fail_next_ack).take() {
            return Err(error);
        }

        let mut state = lock(&self.state);
        let group_state = state
            .streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .ok_or_else(|| no_group(stream, group))?;

        group_state.pending.remove(id);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn no_group(stream: &str, group: &str) -> LogError {
    LogError::NoGroup { stream: stream.to_string(), group: group.to_string() }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================
