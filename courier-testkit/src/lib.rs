//! Test helpers for Courier subscription tests.
//!
//! Provides a scripted log client, a recording dispatcher, a tracing capture
//! layer, and builders for events and log messages.

mod capture;
mod helpers;
mod recorder;
mod scripted;

pub use capture::{CapturedEvent, LogCapture};
pub use helpers::{
    event_fields, invalid_fields, message, new_event, sample_event, stream_messages, wait_until,
};
pub use recorder::RecordingDispatcher;
pub use scripted::ScriptedLog;

pub use anyhow::Result;
