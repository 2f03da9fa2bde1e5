//! Courier Subscription Engine
//!
//! Consumer-side delivery for one consumer registration: reads events from a
//! group-partitioned log, hands each one to a dispatcher and acknowledges it
//! once dispatch returns.
//!
//! # Architecture
//!
//! ```text
//! LogClient ──read_group──→ Subscription ──decode──→ Dispatcher
//!     ↑                        │ (one task per event)      │
//!     └──────────── ack ───────┴───────────────────────────┘
//! ```
//!
//! # Components
//!
//! - **Subscription**: Run loop (backlog drain, then live tail) and acknowledge
//! - **Handle**: Cancellation trigger and completion signal for the owner
//! - **Dispatcher**: Port for the owner's per-event callback
//! - **Config**: Identity, block window and dispatch concurrency bound
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_subscription::{dispatch_fn, Subscription, SubscriptionConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = SubscriptionConfig::new("billing", "orders", "billing");
//! let dispatcher = dispatch_fn(|event| async move {
//!     println!("got {}", event.id);
//! });
//!
//! let handle = Subscription::new(config, log, dispatcher, CancellationToken::new())?.start();
//!
//! // Later
//! handle.shutdown().await;
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod decode;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod subscription;

// Re-exports for convenience
pub use config::SubscriptionConfig;
pub use decode::{decode_message, InvalidMessage};
pub use dispatcher::{dispatch_fn, DispatchFn, Dispatcher};
pub use error::{SubscriptionError, SubscriptionResult};
pub use handle::SubscriptionHandle;
pub use subscription::Subscription;
