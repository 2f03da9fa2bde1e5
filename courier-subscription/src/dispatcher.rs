//! Dispatch port.
//!
//! The owner of a subscription supplies a dispatcher that receives every
//! valid event. Its outcome is not observed: the message is acknowledged
//! as soon as `dispatch` returns.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use courier_domain::Event;

/// Port for delivering decoded events to their consumer.
///
/// Each call runs in its own task, so calls may overlap and complete out
/// of order. Dispatchers that need ordered side effects must enforce it.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Deliver one event.
    async fn dispatch(&self, event: Event);
}

#[async_trait]
impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    async fn dispatch(&self, event: Event) {
        (**self).dispatch(event).await
    }
}

/// Dispatcher backed by an async closure. See [`dispatch_fn`].
pub struct DispatchFn<F>(F);

/// Wrap an async closure as a [`Dispatcher`].
pub fn dispatch_fn<F, Fut>(f: F) -> DispatchFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    DispatchFn(f)
}

#[async_trait]
impl<F, Fut> Dispatcher for DispatchFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn dispatch(&self, event: Event) {
        (self.0)(event).await
    }
}
