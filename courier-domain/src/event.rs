//! Domain event document.
//!
//! Events travel through the log as a single JSON document stored under
//! [`EVENT_FIELD`]. The document follows the CloudEvents 1.0 JSON format:
//! a fixed set of context attributes plus free-form extension attributes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomainError, DomainResult};

/// Payload field that carries the serialized event in a log message.
pub const EVENT_FIELD: &str = "event";

/// Extension attribute recording the log position the event was read from.
pub const BACKEND_ID_EXTENSION: &str = "backendid";

/// The only spec version this codec accepts.
pub const SPEC_VERSION: &str = "1.0";

/// Maximum length of an extension attribute name.
const MAX_EXTENSION_NAME_LEN: usize = 20;

/// Context attribute names that can never be used as extensions.
const RESERVED_ATTRIBUTES: &[&str] = &[
    "specversion",
    "id",
    "source",
    "type",
    "subject",
    "time",
    "datacontenttype",
    "dataschema",
    "data",
    "data_base64",
];

// =============================================================================
// Event
// =============================================================================

/// A domain event.
///
/// # Invariants
/// - `id`, `source` and `type` are required; `validate` rejects empty values
/// - extension names are lower-case ASCII alphanumerics (checked on insert)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Spec version of the document
    pub specversion: String,
    /// Producer-assigned identifier, unique per source
    pub id: String,
    /// Context in which the event happened
    pub source: String,
    /// Event type (e.g., "order.created")
    #[serde(rename = "type")]
    pub event_type: String,
    /// Subject of the event within the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// When the occurrence happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Content type of `data`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacontenttype: Option<String>,
    /// Schema that `data` adheres to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataschema: Option<String>,
    /// Structured payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Binary payload, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_base64: Option<String>,
    /// Extension attributes
    #[serde(flatten)]
    extensions: BTreeMap<String, Value>,
}

impl Event {
    /// Create a new event with the required attributes.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            specversion: SPEC_VERSION.to_string(),
            id: id.into(),
            source: source.into(),
            event_type: event_type.into(),
            subject: None,
            time: None,
            datacontenttype: None,
            dataschema: None,
            data: None,
            data_base64: None,
            extensions: BTreeMap::new(),
        }
    }

    /// Set a JSON payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.datacontenttype = Some("application/json".to_string());
        self.data = Some(data);
        self
    }

    /// Set subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set occurrence time
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Decode an event from its JSON document.
    ///
    /// Unknown top-level attributes are kept as extensions. An empty `id`
    /// is accepted here; callers decide whether to [`validate`](Self::validate).
    ///
    /// # Errors
    /// - `DomainError::Malformed` if the bytes are not an event document
    /// - `DomainError::UnsupportedSpecVersion` for anything but "1.0"
    pub fn decode(bytes: &[u8]) -> DomainResult<Self> {
        let event: Event = serde_json::from_slice(bytes)?;

        if event.specversion != SPEC_VERSION {
            return Err(DomainError::UnsupportedSpecVersion(event.specversion));
        }

        Ok(event)
    }

    /// Encode the event as a JSON document.
    ///
    /// # Errors
    /// Returns `DomainError::MissingAttribute` if the event is not valid.
    pub fn encode(&self) -> DomainResult<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    /// Check the required attributes are non-empty.
    pub fn validate(&self) -> DomainResult<()> {
        if self.id.is_empty() {
            return Err(DomainError::MissingAttribute("id"));
        }
        if self.source.is_empty() {
            return Err(DomainError::MissingAttribute("source"));
        }
        if self.event_type.is_empty() {
            return Err(DomainError::MissingAttribute("type"));
        }
        Ok(())
    }

    /// Set an extension attribute, replacing any previous value.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidExtensionName` if `name` is empty, too long,
    /// not lower-case alphanumeric, or a reserved context attribute.
    pub fn set_extension(&mut self, name: &str, value: impl Into<Value>) -> DomainResult<()> {
        validate_extension_name(name)?;
        self.extensions.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Get an extension attribute.
    pub fn extension(&self, name: &str) -> Option<&Value> {
        self.extensions.get(name)
    }

    /// All extension attributes, ordered by name.
    pub fn extensions(&self) -> &BTreeMap<String, Value> {
        &self.extensions
    }

    /// Record the log position this event was read from.
    pub fn set_backend_id(&mut self, position: impl Into<String>) {
        self.extensions.insert(BACKEND_ID_EXTENSION.to_string(), Value::String(position.into()));
    }

    /// Log position this event was read from, if recorded.
    pub fn backend_id(&self) -> Option<&str> {
        self.extension(BACKEND_ID_EXTENSION).and_then(Value::as_str)
    }
}

fn validate_extension_name(name: &str) -> DomainResult<()> {
    let invalid = |reason| DomainError::InvalidExtensionName { name: name.to_string(), reason };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_EXTENSION_NAME_LEN {
        return Err(invalid("name is longer than 20 characters"));
    }
    if !name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()) {
        return Err(invalid("only lower-case letters and digits are allowed"));
    }
    if RESERVED_ATTRIBUTES.contains(&name) {
        return Err(invalid("name is a reserved context attribute"));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
