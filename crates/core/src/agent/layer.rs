use std::{cell::Cell, fmt};

use serde_json::{Map, Value};
use tracing::{
    Event as TracingEvent, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context};

use crate::agent::console::{ArgValue, ConsoleCapture, ConsoleSink};
use crate::events::LogLevel;

/// Targets whose events are never captured: this crate and the WebSocket stack under the emitter.
/// Capturing those would turn every sent frame into another frame.
const IGNORED_TARGETS: [&str; 3] = ["netscope_core", "tungstenite", "tokio_tungstenite"];

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
}

pub fn is_ignored_target(target: &str) -> bool {
    IGNORED_TARGETS.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// `tracing` layer that forwards the host's events to the inspector as console events.
///
/// Other layers in the subscriber stack still see every event, so the host's own output is
/// unaffected. Events from this crate and the WebSocket stack are ignored, and events raised while
/// a capture is already running on the same thread are skipped.
pub struct CaptureLayer {
    console: ConsoleCapture,
}

impl CaptureLayer {
    pub fn new(console: ConsoleCapture) -> Self {
        Self { console }
    }
}

pub fn level_for(level: &Level) -> LogLevel {
    if *level == Level::ERROR {
        LogLevel::Error
    } else if *level == Level::WARN {
        LogLevel::Warn
    } else if *level == Level::INFO {
        LogLevel::Info
    } else if *level == Level::DEBUG {
        LogLevel::Debug
    } else {
        LogLevel::Log
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &TracingEvent<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_ignored_target(metadata.target()) || CAPTURING.with(Cell::get) {
            return;
        }
        CAPTURING.with(|flag| flag.set(true));
        let _reset = ResetCapturing;

        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        let mut args = Vec::with_capacity(2);
        if let Some(message) = visitor.message {
            args.push(ArgValue::Text(message));
        }
        if !visitor.fields.is_empty() {
            args.push(ArgValue::from(&Value::Object(visitor.fields)));
        }

        self.console.on_log(level_for(metadata.level()), &args);
    }
}

struct ResetCapturing;

impl Drop for ResetCapturing {
    fn drop(&mut self) {
        CAPTURING.with(|flag| flag.set(false));
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.fields.insert(field.name().to_string(), Value::from(rendered));
        }
    }
}

/// Console writer for hosts whose output already goes through `tracing`: the host's subscriber
/// prints, so nothing is written here.
pub struct SilentConsole;

impl ConsoleSink for SilentConsole {
    fn write(&self, _level: LogLevel, _args: &[ArgValue]) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{agent::correlator::tests::RecordingSink, events::Event};
    use serde_json::json;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(f: impl FnOnce()) -> Vec<Event> {
        let sink = Arc::new(RecordingSink::default());
        let layer = CaptureLayer::new(
            ConsoleCapture::new(Arc::new(SilentConsole), sink.clone()).with_stack_traces(false),
        );
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);
        sink.take()
    }

    #[test]
    fn host_events_become_console_events() {
        let events = capture(|| {
            tracing::warn!(target: "host_app", user = 7, "disk almost full");
        });

        assert_eq!(events.len(), 1);
        let Event::LogEmitted(log) = &events[0] else {
            panic!("expected console event");
        };
        assert_eq!(log.level, LogLevel::Warn);
        assert_eq!(log.args, vec![json!("disk almost full"), json!({ "user": 7 })]);
    }

    #[test]
    fn own_events_are_ignored() {
        let events = capture(|| {
            tracing::info!(target: "netscope_core::agent::emitter", "connected");
        });
        assert!(events.is_empty());
    }

    #[test]
    fn websocket_stack_events_are_ignored() {
        let events = capture(|| {
            tracing::trace!(target: "tungstenite::protocol", "Sending frame");
            tracing::trace!(target: "tokio_tungstenite", "received frame");
            tracing::trace!(target: "tungstenite_compat", "unrelated crate");
        });
        assert_eq!(events.len(), 1);
        assert!(is_ignored_target("netscope_core"));
        assert!(!is_ignored_target("netscope_proxy"));
    }

    #[test]
    fn events_raised_during_capture_are_not_recaptured() {
        struct NoisyConsole;
        impl ConsoleSink for NoisyConsole {
            fn write(&self, _level: LogLevel, _args: &[ArgValue]) {
                tracing::info!(target: "host_app", "echo from console writer");
            }
        }

        let sink = Arc::new(RecordingSink::default());
        let layer = CaptureLayer::new(
            ConsoleCapture::new(Arc::new(NoisyConsole), sink.clone()).with_stack_traces(false),
        );
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "host_app", "once");
        });

        assert_eq!(sink.take().len(), 1);
    }

    #[test]
    fn trace_maps_to_plain_log() {
        assert_eq!(level_for(&Level::TRACE), LogLevel::Log);
        assert_eq!(level_for(&Level::ERROR), LogLevel::Error);
    }
}
