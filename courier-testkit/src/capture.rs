//! Tracing layer that captures log events for assertions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// One captured log event.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    /// Severity
    pub level: Level,
    /// Formatted message
    pub message: String,
    /// Structured fields, debug-formatted
    pub fields: BTreeMap<String, String>,
}

/// Captures every tracing event emitted while installed.
///
/// Installation is thread-local, which covers a `#[tokio::test]` running on
/// the default current-thread runtime, including the tasks it spawns.
#[derive(Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    /// Create an empty capture
    pub fn new() -> Self {
        Self::default()
    }

    /// Install as the default subscriber for the current thread.
    ///
    /// Capturing stops when the returned guard is dropped.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }

    /// All captured events
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Captured events at exactly `level`
    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.level == level).collect()
    }

    /// Captured events whose message contains `needle`
    pub fn matching(&self, needle: &str) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.message.contains(needle)).collect()
    }

    /// Forget everything captured so far
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.insert(field.name().to_string(), format!("{:?}", value));
        }
    }
}
