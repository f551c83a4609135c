use std::{
    backtrace::Backtrace,
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::{
    agent::emitter::EventSink,
    events::{EventId, LogEmitted, LogLevel, now_timestamp},
    format::format_log_args,
};

const FUNCTION_PREVIEW_LEN: usize = 100;
const CIRCULAR: &str = "[Circular]";
const UNSERIALIZABLE: &str = "[Unserializable]";

/// A console argument as the host hands it over.
///
/// Objects and arrays live behind [`ObjectCell`] so the host can build shared and cyclic graphs.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Error {
        name: String,
        message: String,
        stack: Option<String>,
    },
    Date(DateTime<Utc>),
    Pattern(String),
    Function {
        name: Option<String>,
        source: String,
    },
    Object(Arc<ObjectCell>),
    /// Something the host cannot describe at all.
    Opaque,
}

impl ArgValue {
    pub fn object() -> Arc<ObjectCell> {
        Arc::new(ObjectCell::new(false))
    }

    pub fn array() -> Arc<ObjectCell> {
        Arc::new(ObjectCell::new(true))
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Text(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Number(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Number(value as f64)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<Arc<ObjectCell>> for ArgValue {
    fn from(value: Arc<ObjectCell>) -> Self {
        ArgValue::Object(value)
    }
}

impl From<&Value> for ArgValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => ArgValue::Null,
            Value::Bool(b) => ArgValue::Bool(*b),
            Value::Number(n) => n.as_f64().map(ArgValue::Number).unwrap_or(ArgValue::Opaque),
            Value::String(s) => ArgValue::Text(s.clone()),
            Value::Array(items) => {
                let cell = ArgValue::array();
                for item in items {
                    cell.push(item.into());
                }
                ArgValue::Object(cell)
            }
            Value::Object(map) => {
                let cell = ArgValue::object();
                for (key, item) in map {
                    cell.set(key, item.into());
                }
                ArgValue::Object(cell)
            }
        }
    }
}

/// A mutable object or array node.
#[derive(Debug)]
pub struct ObjectCell {
    is_array: bool,
    entries: Mutex<Vec<(String, ArgValue)>>,
}

impl ObjectCell {
    fn new(is_array: bool) -> Self {
        Self {
            is_array,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Set `key`, replacing an existing entry of the same name.
    pub fn set(&self, key: &str, value: ArgValue) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key.to_string(), value)),
        }
    }

    pub fn push(&self, value: ArgValue) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let index = entries.len().to_string();
        entries.push((index, value));
    }

    fn snapshot(&self) -> Vec<(String, ArgValue)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Serialized console argument. Closed set of what can cross the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Error {
        name: String,
        message: String,
        stack: Option<String>,
    },
    Date(String),
    Pattern(String),
    Function {
        name: String,
        preview: String,
    },
    Sequence(Vec<LogValue>),
    Mapping(Vec<(String, LogValue)>),
    Circular,
    Unserializable,
}

impl LogValue {
    /// Structural copy of `arg`. An object met a second time anywhere in the graph becomes
    /// [`LogValue::Circular`].
    pub fn capture(arg: &ArgValue) -> LogValue {
        let mut seen = HashSet::new();
        Self::capture_with(arg, &mut seen)
    }

    fn capture_with(arg: &ArgValue, seen: &mut HashSet<*const ObjectCell>) -> LogValue {
        match arg {
            ArgValue::Null => LogValue::Null,
            ArgValue::Bool(b) => LogValue::Bool(*b),
            ArgValue::Number(n) => LogValue::Number(*n),
            ArgValue::Text(s) => LogValue::Text(s.clone()),
            ArgValue::Error {
                name,
                message,
                stack,
            } => LogValue::Error {
                name: name.clone(),
                message: message.clone(),
                stack: stack.clone(),
            },
            ArgValue::Date(at) => {
                LogValue::Date(at.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            ArgValue::Pattern(source) => LogValue::Pattern(source.clone()),
            ArgValue::Function { name, source } => {
                let mut preview: String = source.chars().take(FUNCTION_PREVIEW_LEN).collect();
                preview.push_str("...");
                LogValue::Function {
                    name: name
                        .as_deref()
                        .filter(|n| !n.is_empty())
                        .unwrap_or("anonymous")
                        .to_string(),
                    preview,
                }
            }
            ArgValue::Object(cell) => {
                if !seen.insert(Arc::as_ptr(cell)) {
                    return LogValue::Circular;
                }
                let entries = cell.snapshot();
                if cell.is_array {
                    LogValue::Sequence(
                        entries
                            .iter()
                            .map(|(_, v)| Self::capture_with(v, seen))
                            .collect(),
                    )
                } else {
                    LogValue::Mapping(
                        entries
                            .iter()
                            .map(|(k, v)| (k.clone(), Self::capture_with(v, seen)))
                            .collect(),
                    )
                }
            }
            ArgValue::Opaque => LogValue::Unserializable,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            LogValue::Null => Value::Null,
            LogValue::Bool(b) => Value::Bool(*b),
            // NaN and infinities have no JSON form and become null.
            LogValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(|n| match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::from(f as i64),
                    _ => Value::Number(n),
                })
                .unwrap_or(Value::Null),
            LogValue::Text(s) => Value::String(s.clone()),
            LogValue::Error {
                name,
                message,
                stack,
            } => {
                let mut map = tagged("Error");
                map.insert("name".into(), Value::String(name.clone()));
                map.insert("message".into(), Value::String(message.clone()));
                if let Some(stack) = stack {
                    map.insert("stack".into(), Value::String(stack.clone()));
                }
                Value::Object(map)
            }
            LogValue::Date(value) => {
                let mut map = tagged("Date");
                map.insert("value".into(), Value::String(value.clone()));
                Value::Object(map)
            }
            LogValue::Pattern(value) => {
                let mut map = tagged("RegExp");
                map.insert("value".into(), Value::String(value.clone()));
                Value::Object(map)
            }
            LogValue::Function { name, preview } => {
                let mut map = tagged("Function");
                map.insert("name".into(), Value::String(name.clone()));
                map.insert("value".into(), Value::String(preview.clone()));
                Value::Object(map)
            }
            LogValue::Sequence(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            LogValue::Mapping(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            LogValue::Circular => Value::String(CIRCULAR.to_string()),
            LogValue::Unserializable => Value::String(UNSERIALIZABLE.to_string()),
        }
    }
}

fn tagged(kind: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("__type".into(), Value::String(kind.to_string()));
    map
}

/// The console the host would have written to without instrumentation.
pub trait ConsoleSink: Send + Sync {
    fn write(&self, level: LogLevel, args: &[ArgValue]);
}

pub struct StderrConsole;

impl ConsoleSink for StderrConsole {
    fn write(&self, level: LogLevel, args: &[ArgValue]) {
        let rendered: Vec<Value> = args.iter().map(|a| LogValue::capture(a).to_json()).collect();
        eprintln!("[{level}] {}", format_log_args(&rendered));
    }
}

/// Explicit console entry points. The original console always runs before the event is emitted.
#[derive(Clone)]
pub struct ConsoleCapture {
    original: Arc<dyn ConsoleSink>,
    sink: Arc<dyn EventSink>,
    capture_stack_trace: bool,
}

impl ConsoleCapture {
    pub fn new(original: Arc<dyn ConsoleSink>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            original,
            sink,
            capture_stack_trace: true,
        }
    }

    pub fn with_stack_traces(mut self, enabled: bool) -> Self {
        self.capture_stack_trace = enabled;
        self
    }

    pub fn log(&self, args: &[ArgValue]) {
        self.on_log(LogLevel::Log, args);
    }

    pub fn warn(&self, args: &[ArgValue]) {
        self.on_log(LogLevel::Warn, args);
    }

    pub fn error(&self, args: &[ArgValue]) {
        self.on_log(LogLevel::Error, args);
    }

    pub fn info(&self, args: &[ArgValue]) {
        self.on_log(LogLevel::Info, args);
    }

    pub fn debug(&self, args: &[ArgValue]) {
        self.on_log(LogLevel::Debug, args);
    }

    pub fn on_log(&self, level: LogLevel, args: &[ArgValue]) {
        self.original.write(level, args);

        let stack = (self.capture_stack_trace && level.wants_stack())
            .then(capture_stack)
            .flatten();

        self.sink.emit(
            LogEmitted {
                id: EventId::generate(),
                level,
                args: args.iter().map(|a| LogValue::capture(a).to_json()).collect(),
                timestamp: now_timestamp(),
                stack,
            }
            .into(),
        );
    }
}

fn capture_stack() -> Option<String> {
    let trace = Backtrace::force_capture().to_string();
    let stripped = strip_instrumentation_frames(&trace);
    (!stripped.is_empty()).then_some(stripped)
}

/// Drop the leading frames that belong to the backtrace machinery and to this module, keeping
/// everything from the first host frame on.
pub fn strip_instrumentation_frames(trace: &str) -> String {
    let lines: Vec<&str> = trace.lines().collect();
    let is_internal = |line: &str| {
        line.contains("std::backtrace")
            || line.contains("netscope_core::agent::console")
            || line.contains("netscope_core::agent::layer")
            || line.contains("tracing_core::")
            || line.contains("tracing_subscriber::")
    };

    // A frame is a numbered header line plus optional indented "at file:line" lines.
    let mut start = 0;
    let mut in_internal = false;
    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        let is_header = trimmed
            .split_once(':')
            .is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
        if is_header {
            in_internal = is_internal(trimmed);
            if !in_internal {
                start = index;
                break;
            }
        } else if in_internal {
            start = index + 1;
        }
    }

    lines[start.min(lines.len())..].join("\n")
}
