//! Builders for events and log messages.

use std::time::Duration;

use anyhow::{anyhow, Context};
use courier_domain::{Event, EVENT_FIELD};
use courier_log::{Fields, Message, MessageId, StreamMessages};
use serde_json::json;
use uuid::Uuid;

use crate::Result;

/// A valid event with a fixed id.
pub fn sample_event(id: &str) -> Event {
    Event::new(id, "courier-testkit", "test.event").with_data(json!({ "id": id }))
}

/// A valid event with a fresh time-ordered id.
pub fn new_event() -> Event {
    sample_event(&Uuid::now_v7().to_string())
}

/// Payload fields carrying `event` under the event field.
pub fn event_fields(event: &Event) -> Result<Fields> {
    let document = event.encode().context("Failed to encode test event")?;
    Ok(Fields::from([(EVENT_FIELD.to_string(), document)]))
}

/// Payload fields carrying an arbitrary raw value under the event field.
pub fn invalid_fields(raw: &str) -> Fields {
    Fields::from([(EVENT_FIELD.to_string(), raw.to_string())])
}

/// A log message at position `id` (e.g. "1" or "1700000000000-0").
pub fn message(id: &str, fields: Fields) -> Result<Message> {
    let id: MessageId = id.parse().map_err(|e| anyhow!("{}", e))?;
    Ok(Message::new(id, fields))
}

/// Wrap messages as a single-stream read result.
pub fn stream_messages(stream: &str, messages: Vec<Message>) -> Vec<StreamMessages> {
    vec![StreamMessages { stream: stream.to_string(), messages }]
}

/// Poll `condition` until it holds, failing after two seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| anyhow!("Timed out waiting for {}", what))
}
