//! Owner-facing control of a running subscription.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Handle to a started subscription.
///
/// Cloneable: any number of parties may wait for completion.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    cancel: CancellationToken,
    stopped: watch::Receiver<bool>,
}

impl SubscriptionHandle {
    pub(crate) fn new(cancel: CancellationToken, stopped: watch::Receiver<bool>) -> Self {
        Self { cancel, stopped }
    }

    /// Ask the subscription to stop.
    ///
    /// Cooperative: the in-flight read returns, the current iteration
    /// finishes, and in-flight dispatches run to completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the subscription has fully stopped
    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Wait until the subscription has fully stopped.
    ///
    /// After this returns no further dispatch happens and the log client
    /// is no longer used by the subscription.
    ///
    /// Waits for every in-flight dispatch, so a dispatcher that never
    /// returns keeps this pending forever. Wrap it in
    /// `tokio::time::timeout` when shutdown latency matters.
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        // Err means the run task is gone without signaling (it panicked);
        // either way there is nothing left to wait for.
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }

    /// Cancel and wait for the subscription to stop.
    ///
    /// Same caveat as [`stopped`](Self::stopped): a hung dispatcher blocks
    /// this indefinitely.
    pub async fn shutdown(&self) {
        self.cancel();
        self.stopped().await;
    }
}
