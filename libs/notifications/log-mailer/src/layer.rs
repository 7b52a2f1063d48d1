//! `tracing` integration: a subscriber layer that mails events.
//!
//! ```ignore
//! use log_mailer::{MailLayer, MailSink, MailerOptions, MessageOptions};
//! use tracing_subscriber::prelude::*;
//!
//! let sink = MailSink::new(MailerOptions::new(MessageOptions::new("ops@example.com")))?;
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(MailLayer::new(sink.clone()))
//!     .init();
//!
//! tracing::error!(order_id = 42, "payment capture failed");
//! sink.flush().await;
//! ```

use crate::record::Record;
use crate::sink::MailSink;
use serde_json::{Map, Value};
use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Targets whose events are never mailed: the sink's own diagnostics and
/// the transport underneath it would otherwise feed back into the sink.
const IGNORED_TARGETS: &[&str] = &[env!("CARGO_CRATE_NAME"), "lettre"];

/// Layer that turns `tracing` events into [`Record`]s for a [`MailSink`]
#[derive(Debug, Clone)]
pub struct MailLayer {
    sink: MailSink,
    max_level: Level,
}

impl MailLayer {
    /// Mail `ERROR` events only
    pub fn new(sink: MailSink) -> Self {
        Self {
            sink,
            max_level: Level::ERROR,
        }
    }

    /// Mail events at `level` or more severe
    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    pub fn sink(&self) -> &MailSink {
        &self.sink
    }

    fn is_ignored(target: &str) -> bool {
        IGNORED_TARGETS.iter().any(|ignored| {
            target == *ignored
                || target
                    .strip_prefix(ignored)
                    .is_some_and(|rest| rest.starts_with("::"))
        })
    }

    /// Convert an event into a record with a formatted display line
    pub fn record_from_event(event: &Event<'_>) -> Record {
        let metadata = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let mut display = format!(
            "{} {:>5} {}: {}",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            metadata.level(),
            metadata.target(),
            visitor.message
        );
        for (key, value) in &visitor.fields {
            match value {
                Value::String(s) => {
                    let _ = write!(display, " {key}={s}");
                }
                other => {
                    let _ = write!(display, " {key}={other}");
                }
            }
        }

        Record {
            level: metadata.level().as_str().to_ascii_lowercase(),
            message: visitor.message,
            metadata: visitor.fields,
            display_text: Some(display),
        }
    }
}

impl<S> Layer<S> for MailLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.max_level || Self::is_ignored(metadata.target()) {
            return;
        }

        self.sink.log(Self::record_from_event(event), || {});
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: Map<String, Value>,
}

impl RecordVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for RecordVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOptions, MockBackend};
    use crate::config::{MailerOptions, MessageOptions};
    use std::sync::Arc;
    use tracing_subscriber::prelude::*;

    fn setup(level: Level) -> (MockBackend, MailSink, tracing::subscriber::DefaultGuard) {
        let backend = MockBackend::new();
        let sink = MailSink::new(
            MailerOptions::new(
                MessageOptions::new("ops@example.com").subject("[{{ level }}] {{ message }}"),
            )
            .backend(BackendOptions::shared(Arc::new(backend.clone()))),
        )
        .unwrap();
        let subscriber =
            tracing_subscriber::registry().with(MailLayer::new(sink.clone()).with_max_level(level));
        let guard = tracing::subscriber::set_default(subscriber);
        (backend, sink, guard)
    }

    #[tokio::test]
    async fn test_error_events_are_mailed() {
        let (backend, sink, _guard) = setup(Level::ERROR);

        tracing::error!(target: "billing", order_id = 42, retry = false, "payment capture failed\nstack...");
        tracing::warn!(target: "billing", "not severe enough");
        sink.flush().await;

        let sent = backend.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "[error] payment capture failed");
        assert!(sent[0].text.contains("ERROR billing: payment capture failed"));
        assert!(sent[0].text.contains("order_id=42"));
        assert!(sent[0].text.contains("retry=false"));
    }

    #[tokio::test]
    async fn test_max_level_widens_selection() {
        let (backend, sink, _guard) = setup(Level::WARN);

        tracing::warn!(target: "disk", "usage at 91%");
        tracing::info!(target: "disk", "usage at 50%");
        sink.flush().await;

        let sent = backend.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "[warn] usage at 91%");
    }

    #[tokio::test]
    async fn test_own_events_are_ignored() {
        let (backend, sink, _guard) = setup(Level::TRACE);

        tracing::error!(target: "log_mailer::sink", "internal failure");
        tracing::error!(target: "lettre::transport", "smtp noise");
        tracing::error!(target: "log_mailer_cli", "the application itself");
        sink.flush().await;

        let sent = backend.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.contains("the application itself"));
    }

    #[test]
    fn test_is_ignored_matches_path_segments() {
        assert!(MailLayer::is_ignored("log_mailer"));
        assert!(MailLayer::is_ignored("log_mailer::backend::smtp"));
        assert!(MailLayer::is_ignored("lettre"));
        assert!(!MailLayer::is_ignored("log_mailer_cli"));
        assert!(!MailLayer::is_ignored("lettrebox"));
    }
}
