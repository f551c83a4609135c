use chrono::{DateTime, Local};
use serde_json::Value;

use crate::{config::DEFAULT_ID_HEADER, query::StatusClass, store::RequestRecord};

const CURL_SKIPPED_HEADERS: [&str; 3] = ["host", "connection", "content-length"];

fn skipped_in_curl(name: &str) -> bool {
    CURL_SKIPPED_HEADERS
        .iter()
        .chain([&DEFAULT_ID_HEADER])
        .any(|skipped| skipped.eq_ignore_ascii_case(name))
}

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render a request record as an equivalent `curl` command, one argument per line.
pub fn to_curl(record: &RequestRecord) -> String {
    let mut parts = vec!["curl".to_string()];

    if !record.method.is_empty() && record.method != "GET" {
        parts.push(format!("-X {}", record.method));
    }

    if let Some(headers) = &record.request_headers {
        for (name, value) in headers {
            if skipped_in_curl(name) {
                continue;
            }
            parts.push(format!("-H {}", shell_quote(&format!("{name}: {value}"))));
        }
    }

    if let Some(body) = &record.request_body_snippet {
        if !body.is_empty() {
            let body = serde_json::from_str::<Value>(body)
                .map(|json| json.to_string())
                .unwrap_or_else(|_| body.clone());
            parts.push(format!("-d {}", shell_quote(&body)));
        }
    }

    parts.push(shell_quote(&record.url));
    parts.join(" \\\n  ")
}

/// Format a duration as `850ms` or `1.25s`.
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.2}s", ms as f64 / 1000.0)
    }
}

/// Local wall-clock time `HH:MM:SS.mmm` for an RFC 3339 timestamp. Unparseable input is
/// returned as-is.
pub fn format_clock_time(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|at| at.with_timezone(&Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Status column text: the code, `ERR` for failures, `...` while in flight.
pub fn format_status(record: &RequestRecord) -> String {
    match (record.status, record.finished_at.is_some()) {
        (_, false) => "...".to_string(),
        (Some(status), true) if StatusClass::of(record) != StatusClass::Error => status.to_string(),
        (Some(status), true) if status != 0 => format!("ERR {status}"),
        _ => "ERR".to_string(),
    }
}

/// One-line rendering of a serialized console argument.
pub fn format_log_arg(arg: &Value) -> String {
    match arg {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => arg.to_string(),
        Value::Object(map) => match map.get("__type").and_then(Value::as_str) {
            Some("Error") => format!(
                "{}: {}",
                map.get("name").and_then(Value::as_str).unwrap_or("Error"),
                map.get("message").and_then(Value::as_str).unwrap_or_default()
            ),
            Some("Date") | Some("RegExp") => map
                .get("value")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Some("Function") => format!(
                "function {}()",
                map.get("name").and_then(Value::as_str).unwrap_or("anonymous")
            ),
            _ => arg.to_string(),
        },
        Value::Array(_) => arg.to_string(),
    }
}

pub fn format_log_args(args: &[Value]) -> String {
    args.iter()
        .map(format_log_arg)
        .collect::<Vec<_>>()
        .join(" ")
}
