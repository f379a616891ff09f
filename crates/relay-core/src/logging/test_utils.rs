//! In-memory log capture for tests.
//!
//! [`capture_logs`] installs a thread-local subscriber. On a current-thread
//! tokio runtime (the `#[tokio::test]` default) it also sees events from
//! spawned tasks, together with the name of the span each event fired in.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// One recorded event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// Module target.
    pub target: String,
    /// Rendered `message` field.
    pub message: String,
    /// Remaining fields, rendered.
    pub fields: BTreeMap<String, String>,
    /// Innermost span the event fired in.
    pub span: Option<String>,
}

/// Shared handle to the recorded events.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    /// Snapshot of every event so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    fn find(&self, matches: impl Fn(&CapturedEvent) -> bool) -> Option<CapturedEvent> {
        self.events.lock().iter().find(|e| matches(e)).cloned()
    }

    /// Whether some event's message contains `needle`.
    pub fn has_message(&self, needle: &str) -> bool {
        self.find(|e| e.message.contains(needle)).is_some()
    }

    /// Whether some event at `level` has a message containing `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.find(|e| e.level == level && e.message.contains(needle))
            .is_some()
    }

    /// Number of events at `level`.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.events.lock().iter().filter(|e| e.level == level).count()
    }

    /// `field` of the first event whose message contains `needle`.
    pub fn field_of(&self, needle: &str, field: &str) -> Option<String> {
        self.find(|e| e.message.contains(needle))
            .and_then(|e| e.fields.get(field).cloned())
    }

    /// Span of the first event whose message contains `needle`.
    pub fn span_of(&self, needle: &str) -> Option<String> {
        self.find(|e| e.message.contains(needle))
            .and_then(|e| e.span)
    }
}

#[derive(Default)]
struct Recorder {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Recorder {
    fn put(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            let _ = self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for Recorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

struct CaptureLayer {
    logs: CapturedLogs,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut recorder = Recorder::default();
        event.record(&mut recorder);
        let metadata = event.metadata();
        let span = ctx.event_span(event).map(|s| s.name().to_owned());
        self.logs.events.lock().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            message: recorder.message,
            fields: recorder.fields,
            span,
        });
    }
}

/// Capture every event on this thread until the guard drops.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(CaptureLayer { logs: logs.clone() })
        .with(LevelFilter::TRACE)
        .set_default();
    (logs, guard)
}
