//! Courier Domain Layer
//!
//! Pure event model with zero I/O dependencies.
//! Contains the domain event document, its JSON codec, and the wire
//! constants shared by producers and the subscription engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;

pub use error::{DomainError, DomainResult};
pub use event::{Event, BACKEND_ID_EXTENSION, EVENT_FIELD, SPEC_VERSION};
