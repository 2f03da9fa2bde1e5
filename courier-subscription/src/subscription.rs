//! Subscription run loop.
//!
//! A subscription drains its consumer's backlog first, then follows the
//! live tail of the group.
//!
//! # Architecture
//!
//! ```text
//! Subscription::start()
//!     ↓
//! ┌─────────────────────────────────────────────┐
//! │ Run loop (one task)                         │
//! │ - Check cancellation token                  │
//! │ - Blocking group read (count = 1)           │
//! │ - Classify: data / benign / operational     │
//! │ - Backlog drained → switch to live tail     │
//! │ - Decode; invalid → ack + drop              │
//! │ - Valid → spawn dispatch-then-ack task      │
//! └─────────────────────────────────────────────┘
//!     ↓ cancelled
//! Wait for in-flight dispatch tasks → signal stopped
//! ```
//!
//! # Cursor
//!
//! The cursor starts at the backlog start (`0-0`). While draining the backlog
//! it advances to each processed message so the next read skips entries whose
//! dispatch is still running. The first empty backlog read switches it to the
//! live tail (`>`), where it stays.
//!
//! # Cancellation
//!
//! Cooperative. The token is checked at the top of every iteration and is
//! handed to the read call, which returns promptly once it fires. In-flight
//! dispatches are never aborted.

use std::sync::Arc;

use courier_domain::Event;
use courier_log::{LogClient, LogResult, Message, MessageId, StartId, StreamMessages};
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::SubscriptionConfig;
use crate::decode::decode_message;
use crate::dispatcher::Dispatcher;
use crate::error::SubscriptionResult;
use crate::handle::SubscriptionHandle;

// =============================================================================
// Acknowledger
// =============================================================================

/// Acknowledges messages of one stream/group. Shared with dispatch tasks.
struct Acknowledger<L: ?Sized> {
    client: Arc<L>,
    stream: String,
    group: String,
}

impl<L: LogClient + ?Sized> Acknowledger<L> {
    async fn ack(&self, id: &MessageId) -> LogResult<()> {
        self.client.ack(&self.stream, &self.group, id).await
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// A single consumer registration on a log stream.
///
/// # Lifecycle
///
/// 1. Created with config, shared log client, dispatcher and cancellation token
/// 2. `start()` consumes it and spawns the run loop
/// 3. Runs until the token is cancelled
/// 4. Waits for in-flight dispatch tasks
/// 5. Signals completion through the handle, exactly once
pub struct Subscription<L: LogClient + ?Sized + 'static, D: Dispatcher> {
    config: SubscriptionConfig,
    acknowledger: Arc<Acknowledger<L>>,
    dispatcher: Arc<D>,
    cancel: CancellationToken,
    /// Bounds concurrent dispatch tasks when configured
    limiter: Option<Arc<Semaphore>>,
    tasks: TaskTracker,
}

impl<L, D> Subscription<L, D>
where
    L: LogClient + ?Sized + 'static,
    D: Dispatcher,
{
    /// Create a new subscription.
    ///
    /// # Arguments
    ///
    /// * `config` - Identity, block window and dispatch bound
    /// * `client` - Shared log client; only used for reads and acknowledgements
    /// * `dispatcher` - Receives every valid event
    /// * `cancel` - Cancelling it stops the subscription
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::Config` if the configuration is invalid.
    pub fn new(
        config: SubscriptionConfig,
        client: Arc<L>,
        dispatcher: D,
        cancel: CancellationToken,
    ) -> SubscriptionResult<Self> {
        config.validate()?;

        let acknowledger = Arc::new(Acknowledger {
            client,
            stream: config.stream.clone(),
            group: config.group.clone(),
        });
        let limiter = config.max_in_flight.map(|max| Arc::new(Semaphore::new(max)));

        Ok(Self {
            config,
            acknowledger,
            dispatcher: Arc::new(dispatcher),
            cancel,
            limiter,
            tasks: TaskTracker::new(),
        })
    }

    /// Subscription configuration
    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Acknowledge a message of this subscription's stream and group.
    ///
    /// No retry; the client's error is returned unchanged.
    pub async fn ack(&self, id: &MessageId) -> LogResult<()> {
        self.acknowledger.ack(id).await
    }

    /// Spawn the run loop.
    ///
    /// Consumes the subscription, so it can only be started once.
    pub fn start(self) -> SubscriptionHandle {
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let handle = SubscriptionHandle::new(self.cancel.clone(), stopped_rx);

        tokio::spawn(self.run(stopped_tx));

        handle
    }

    /// Run until cancelled, then signal completion.
    ///
    /// Owns the only sender of the completion signal, so it is sent once.
    async fn run(self, stopped: watch::Sender<bool>) {
        info!(
            subscription = %self.config.name,
            stream = %self.config.stream,
            group = %self.config.group,
            consumer = %self.config.consumer,
            "Subscription started"
        );

        let mut cursor = StartId::backlog();

        while !self.cancel.is_cancelled() {
            cursor = self.poll(cursor).await;
        }

        self.tasks.close();
        if !self.tasks.is_empty() {
            debug!(
                subscription = %self.config.name,
                in_flight = self.tasks.len(),
                "Waiting for in-flight dispatches"
            );
        }
        self.tasks.wait().await;

        info!(subscription = %self.config.name, "Subscription stopped");

        // The owner may tear down the client once stopped is observed
        drop(self);
        stopped.send_replace(true);
    }

    /// One read iteration. Returns the cursor for the next read.
    async fn poll(&self, cursor: StartId) -> StartId {
        let request = self.config.read_request(cursor);

        let streams = match self.client().read_group(&request, &self.cancel).await {
            Ok(streams) => streams,
            Err(e) => {
                if !e.is_benign() {
                    error!(
                        subscription = %self.config.name,
                        group = %self.config.group,
                        error = %e,
                        "Error reading events from consumer group"
                    );
                }
                // Instantly failing clients must not starve other tasks
                tokio::task::yield_now().await;
                return cursor;
            }
        };

        let batch = match <[StreamMessages; 1]>::try_from(streams) {
            Ok([batch]) => batch,
            Err(streams) => {
                error!(
                    subscription = %self.config.name,
                    streams = ?streams,
                    "Unexpected number of streams read"
                );
                tokio::task::yield_now().await;
                return cursor;
            }
        };

        if batch.messages.is_empty() {
            if cursor.is_backlog() {
                debug!(subscription = %self.config.name, "Backlog drained, switching to live tail");
                return StartId::NewOnly;
            }
            tokio::task::yield_now().await;
            return cursor;
        }

        let mut cursor = cursor;
        for message in batch.messages {
            let id = message.id;
            self.process(message).await;

            // Skip entries still being dispatched on the next backlog read
            if cursor.is_backlog() {
                cursor = StartId::After(id);
            }
        }
        cursor
    }

    /// Decode a message and either drop it or hand it to a dispatch task.
    async fn process(&self, message: Message) {
        let id = message.id;

        let mut event = match decode_message(&message) {
            Ok(event) => event,
            Err(reason) => {
                warn!(
                    subscription = %self.config.name,
                    message_id = %id,
                    reason = %reason,
                    "Removing invalid message from log"
                );
                if let Err(e) = self.ack(&id).await {
                    error!(
                        subscription = %self.config.name,
                        message_id = %id,
                        error = %e,
                        "Could not acknowledge invalid message"
                    );
                }
                return;
            }
        };

        event.set_backend_id(id.to_string());
        self.spawn_dispatch(id, event).await;
    }

    /// Dispatch then acknowledge, off the run loop.
    ///
    /// With a dispatch bound configured, waits here for a free slot.
    async fn spawn_dispatch(&self, id: MessageId, event: Event) {
        let permit = match &self.limiter {
            // The semaphore is never closed
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let acknowledger = Arc::clone(&self.acknowledger);
        let subscription = self.config.name.clone();

        self.tasks.spawn(async move {
            let event_id = event.id.clone();
            dispatcher.dispatch(event).await;

            if let Err(e) = acknowledger.ack(&id).await {
                error!(
                    subscription = %subscription,
                    message_id = %id,
                    event_id = %event_id,
                    error = %e,
                    "Could not acknowledge message"
                );
            }
            drop(permit);
        });
    }

    fn client(&self) -> &L {
        &self.acknowledger.client
    }
}

// =============================================================================
// Tests
// =============================================================================
