//! Dispatcher that records what it receives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courier_domain::Event;
use courier_subscription::Dispatcher;
use tokio::sync::Semaphore;

#[derive(Default)]
struct Inner {
    events: Mutex<Vec<Event>>,
    delay: Option<Duration>,
    /// Dispatches wait for a permit when set
    gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Records every dispatched event.
///
/// Cloning shares the recording, so a clone can be handed to the
/// subscription while the test keeps another for assertions.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    inner: Arc<Inner>,
}

impl RecordingDispatcher {
    /// Dispatcher that returns immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher that sleeps `delay` before returning
    pub fn with_delay(delay: Duration) -> Self {
        Self { inner: Arc::new(Inner { delay: Some(delay), ..Inner::default() }) }
    }

    /// Dispatcher that blocks every call until [`release`](Self::release)d
    pub fn gated() -> Self {
        Self { inner: Arc::new(Inner { gate: Some(Semaphore::new(0)), ..Inner::default() }) }
    }

    /// Let `n` blocked or future dispatches return
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.inner.gate {
            gate.add_permits(n);
        }
    }

    /// Events dispatched so far, in call order
    pub fn events(&self) -> Vec<Event> {
        self.inner.events.lock().unwrap().clone()
    }

    /// Ids of events dispatched so far
    pub fn event_ids(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.id).collect()
    }

    /// Number of dispatch calls started
    pub fn count(&self) -> usize {
        self.inner.events.lock().unwrap().len()
    }

    /// Dispatches currently running
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of dispatches observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: Event) {
        let running = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        self.inner.events.lock().unwrap().push(event);

        if let Some(delay) = self.inner.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.inner.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
