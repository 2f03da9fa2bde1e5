//! Courier Log Port
//!
//! Interface to a named, group-partitioned append log, plus an in-process
//! implementation used for tests and development.
//!
//! # Architecture
//!
//! ```text
//! Subscription → LogClient (port) → MemoryLog | external adapter
//! ```
//!
//! # Components
//!
//! - **Types**: Message identifiers, read cursors, read requests and results
//! - **Ports**: `LogClient` trait (blocking group read + acknowledge)
//! - **Errors**: `LogError` with a structured benign/operational classification
//! - **Memory**: `MemoryLog`, consumer groups with pending-entry tracking
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_log::{GroupStart, LogClient, MemoryLog, ReadGroupRequest, StartId};
//!
//! let log = MemoryLog::new();
//! log.create_group("orders", "billing", GroupStart::Beginning, true)?;
//! log.append("orders", [("event".to_string(), payload)].into())?;
//!
//! let request = ReadGroupRequest::new("orders", "billing", "worker-1", StartId::NewOnly);
//! let streams = log.read_group(&request, &cancel).await?;
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod ports;
pub mod types;

// Re-exports for convenience
pub use error::{ErrorKind, LogError, LogResult};
pub use memory::{GroupStart, MemoryLog, PendingEntry};
pub use ports::LogClient;
pub use types::{Fields, Message, MessageId, ReadGroupRequest, StartId, StreamMessages};
