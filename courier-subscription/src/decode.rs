//! Message to event decoding.

use courier_domain::{DomainError, Event, EVENT_FIELD};
use courier_log::Message;
use thiserror::Error;
use tracing::debug;

/// Why a log message could not be turned into a dispatchable event.
///
/// Invalid messages are acknowledged and dropped so they are not redelivered.
#[derive(Debug, Error)]
pub enum InvalidMessage {
    /// The payload has no event field
    #[error("message has no {:?} field", EVENT_FIELD)]
    MissingEventField,

    /// The event field does not hold a valid event document
    #[error("could not decode event: {0}")]
    Undecodable(#[from] DomainError),

    /// The decoded event has an empty identifier
    #[error("event has an empty id")]
    EmptyId,
}

/// Decode the event carried by a log message.
///
/// Fields other than [`EVENT_FIELD`] are ignored.
pub fn decode_message(message: &Message) -> Result<Event, InvalidMessage> {
    for field in message.fields.keys().filter(|field| field.as_str() != EVENT_FIELD) {
        debug!(message_id = %message.id, field = %field, "Ignoring unexpected field in message");
    }

    let payload = message.fields.get(EVENT_FIELD).ok_or(InvalidMessage::MissingEventField)?;
    let event = Event::decode(payload.as_bytes())?;

    if event.id.is_empty() {
        return Err(InvalidMessage::EmptyId);
    }

    Ok(event)
}

// =============================================================================
// Tests
// =============================================================================
