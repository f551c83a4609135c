use chrono::{SecondsFormat, Utc};

/// Current time as an RFC 3339 UTC string with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
