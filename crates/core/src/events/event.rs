use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{error::Result, events::EventId};

/// Lower-cased header name to value.
pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Warn,
    Error,
    Info,
    Debug,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Log,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    pub fn wants_stack(&self) -> bool {
        matches!(self, LogLevel::Warn | LogLevel::Error)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown log level: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStarted {
    pub id: EventId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(
        default,
        deserialize_with = "lenient_headers",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_headers: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body_snippet: Option<String>,
    #[serde(default)]
    pub started_at: String,
}

impl RequestStarted {
    pub const EVENT_TYPE: &'static str = "request";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFinished {
    pub id: EventId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_headers",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_headers: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body_snippet: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub finished_at: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RequestFinished {
    pub const EVENT_TYPE: &'static str = "response";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEmitted {
    pub id: EventId,
    pub level: LogLevel,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl LogEmitted {
    pub const EVENT_TYPE: &'static str = "console";
}

/// One message on the wire, discriminated by its `type` field.
///
/// Only `type` and `id` are required. Agents that leave out other fields still get their events
/// through; the session fills the gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "request")]
    RequestStarted(RequestStarted),
    #[serde(rename = "response")]
    RequestFinished(RequestFinished),
    #[serde(rename = "console")]
    LogEmitted(LogEmitted),
}

impl Event {
    pub fn id(&self) -> &EventId {
        match self {
            Event::RequestStarted(e) => &e.id,
            Event::RequestFinished(e) => &e.id,
            Event::LogEmitted(e) => &e.id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Event::RequestStarted(_) => RequestStarted::EVENT_TYPE,
            Event::RequestFinished(_) => RequestFinished::EVENT_TYPE,
            Event::LogEmitted(_) => LogEmitted::EVENT_TYPE,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            Event::RequestStarted(e) => &e.started_at,
            Event::RequestFinished(e) => &e.finished_at,
            Event::LogEmitted(e) => &e.timestamp,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}

impl From<RequestStarted> for Event {
    fn from(value: RequestStarted) -> Self {
        Event::RequestStarted(value)
    }
}

impl From<RequestFinished> for Event {
    fn from(value: RequestFinished) -> Self {
        Event::RequestFinished(value)
    }
}

impl From<LogEmitted> for Event {
    fn from(value: LogEmitted) -> Self {
        Event::LogEmitted(value)
    }
}

/// Header values as sent by client libraries are not always strings.
pub fn stringify_header_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lenient_headers<'de, D>(deserializer: D) -> std::result::Result<Option<Headers>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|map| {
        map.into_iter()
            .map(|(k, v)| (k, stringify_header_value(&v)))
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_request_frame() {
        let frame = json!({
            "type": "request",
            "id": "1700000000000-9f1c2a",
            "url": "https://api.example.com/users",
            "method": "POST",
            "requestHeaders": { "content-type": "application/json" },
            "requestBodySnippet": "{\"name\":\"a\"}",
            "startedAt": "2024-01-01T00:00:00.000Z"
        })
        .to_string();

        let Event::RequestStarted(started) = Event::decode(&frame).unwrap() else {
            panic!("expected request frame");
        };
        assert_eq!(started.id.as_str(), "1700000000000-9f1c2a");
        assert_eq!(started.method, "POST");
        assert_eq!(
            started.request_headers.unwrap()["content-type"],
            "application/json"
        );
    }

    #[test]
    fn decodes_response_frame_with_optional_fields_missing() {
        let frame = r#"{"type":"response","id":"2","url":"https://x/z","status":500,
            "durationMs":10,"finishedAt":"t1","isError":false}"#;

        let event = Event::decode(frame).unwrap();
        assert_eq!(event.event_type(), "response");
        let Event::RequestFinished(finished) = event else {
            panic!("expected response frame");
        };
        assert_eq!(finished.status, 500);
        assert!(finished.status_text.is_none());
        assert!(finished.response_headers.is_none());
    }

    #[test]
    fn non_string_header_values_are_stringified() {
        let frame = json!({
            "type": "request",
            "id": "3",
            "url": "/a",
            "method": "GET",
            "requestHeaders": { "x-retry": 3, "x-flag": true, "common": { "accept": "*/*" } },
            "startedAt": "t0"
        })
        .to_string();

        let Event::RequestStarted(started) = Event::decode(&frame).unwrap() else {
            panic!("expected request frame");
        };
        let headers = started.request_headers.unwrap();
        assert_eq!(headers["x-retry"], "3");
        assert_eq!(headers["x-flag"], "true");
        assert_eq!(headers["common"], r#"{"accept":"*/*"}"#);
    }

    #[test]
    fn encodes_camel_case_and_skips_absent_fields() {
        let event = Event::from(LogEmitted {
            id: EventId::from("7"),
            level: LogLevel::Warn,
            args: vec![json!("careful")],
            timestamp: "t".to_string(),
            stack: None,
        });

        let value: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "type": "console", "id": "7", "level": "warn", "args": ["careful"], "timestamp": "t" })
        );
    }

    #[test]
    fn minimal_frames_decode_with_defaults() {
        let Event::RequestFinished(finished) =
            Event::decode(r#"{"type":"response","id":"2","url":"https://x/z","status":500,"isError":false}"#)
                .unwrap()
        else {
            panic!("expected response frame");
        };
        assert_eq!(finished.status, 500);
        assert_eq!(finished.duration_ms, 0);
        assert!(finished.finished_at.is_empty());

        let Event::RequestStarted(started) = Event::decode(r#"{"type":"request","id":"3"}"#).unwrap()
        else {
            panic!("expected request frame");
        };
        assert!(started.method.is_empty());

        assert!(Event::decode(r#"{"type":"console","id":"4","level":"info"}"#).is_ok());
        assert!(Event::decode(r#"{"type":"response","status":200}"#).is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(Event::decode(r#"{"type":"ping","id":"1"}"#).is_err());
        assert!(Event::decode("not json").is_err());
    }

    #[test]
    fn log_level_parses_case_insensitively() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }
}
