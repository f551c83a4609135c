use std::{fmt, str::FromStr};

use crate::{
    events::LogLevel,
    format::format_log_args,
    store::{LogRecord, RequestRecord, SessionStore},
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MethodFilter {
    #[default]
    All,
    Exact(String),
}

impl MethodFilter {
    pub fn matches(&self, method: &str) -> bool {
        match self {
            MethodFilter::All => true,
            MethodFilter::Exact(expected) => expected == method,
        }
    }
}

impl FromStr for MethodFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("method filter cannot be empty".to_string());
        }
        if s.eq_ignore_ascii_case("all") || s == "*" {
            return Ok(MethodFilter::All);
        }
        Ok(MethodFilter::Exact(s.to_uppercase()))
    }
}

/// Status buckets. A record belongs to exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Success,
    Redirect,
    ClientError,
    ServerError,
    /// `isError`, no status yet, status 0, or a status outside 2xx..5xx.
    Error,
}

impl StatusClass {
    pub const ALL: [StatusClass; 5] = [
        StatusClass::Success,
        StatusClass::Redirect,
        StatusClass::ClientError,
        StatusClass::ServerError,
        StatusClass::Error,
    ];

    pub fn of(record: &RequestRecord) -> StatusClass {
        if record.is_error() {
            return StatusClass::Error;
        }
        match record.status.map(|status| status / 100) {
            Some(2) => StatusClass::Success,
            Some(3) => StatusClass::Redirect,
            Some(4) => StatusClass::ClientError,
            Some(5) => StatusClass::ServerError,
            _ => StatusClass::Error,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusClass::Success => "2xx",
            StatusClass::Redirect => "3xx",
            StatusClass::ClientError => "4xx",
            StatusClass::ServerError => "5xx",
            StatusClass::Error => "ERR",
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Class(StatusClass),
}

impl StatusFilter {
    pub fn matches(&self, record: &RequestRecord) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Class(class) => StatusClass::of(record) == *class,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        StatusClass::ALL
            .into_iter()
            .find(|class| class.label().eq_ignore_ascii_case(s))
            .map(StatusFilter::Class)
            .ok_or_else(|| format!("unknown status filter: {s} (expected ALL, 2xx..5xx or ERR)"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelFilter {
    #[default]
    All,
    Exact(LogLevel),
}

impl LevelFilter {
    pub fn matches(&self, level: LogLevel) -> bool {
        match self {
            LevelFilter::All => true,
            LevelFilter::Exact(expected) => *expected == level,
        }
    }
}

impl FromStr for LevelFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(LevelFilter::All);
        }
        s.trim().parse().map(LevelFilter::Exact)
    }
}

fn text_matches(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Request list filter. All criteria must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub search: String,
    pub method: MethodFilter,
    pub status: StatusFilter,
}

impl RequestFilter {
    pub fn matches(&self, record: &RequestRecord) -> bool {
        text_matches(&record.url, &self.search)
            && self.method.matches(&record.method)
            && self.status.matches(record)
    }

    pub fn apply<'a>(&self, store: &'a SessionStore) -> Vec<&'a RequestRecord> {
        store
            .requests_newest_first()
            .filter(|r| self.matches(r))
            .collect()
    }
}

/// Console list filter. The text search runs over the rendered argument list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub search: String,
    pub level: LevelFilter,
}

impl LogFilter {
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.level.matches(record.level)
            && (self.search.is_empty() || text_matches(&format_log_args(&record.args), &self.search))
    }

    pub fn apply<'a>(&self, store: &'a SessionStore) -> Vec<&'a LogRecord> {
        store
            .logs_newest_first()
            .filter(|l| self.matches(l))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, LogEmitted, RequestFinished, RequestStarted};
    use serde_json::json;

    fn store_with(events: Vec<Event>) -> SessionStore {
        let mut store = SessionStore::new();
        for event in events {
            store.ingest(event);
        }
        store
    }

    fn start(id: &str, method: &str, url: &str) -> Event {
        RequestStarted {
            id: id.into(),
            url: url.into(),
            method: method.into(),
            request_headers: None,
            request_body_snippet: None,
            started_at: "s".into(),
        }
        .into()
    }

    fn finish(id: &str, status: u16, is_error: bool) -> Event {
        RequestFinished {
            id: id.into(),
            url: String::new(),
            status,
            status_text: None,
            response_headers: None,
            response_body_snippet: None,
            duration_ms: 1,
            finished_at: "f".into(),
            is_error,
            error_message: None,
        }
        .into()
    }

    fn ids(records: Vec<&RequestRecord>) -> Vec<&str> {
        records.into_iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn filter_values_parse_from_text() {
        assert_eq!("ALL".parse::<MethodFilter>().unwrap(), MethodFilter::All);
        assert_eq!(
            "post".parse::<MethodFilter>().unwrap(),
            MethodFilter::Exact("POST".into())
        );
        assert_eq!(
            "5XX".parse::<StatusFilter>().unwrap(),
            StatusFilter::Class(StatusClass::ServerError)
        );
        assert_eq!(
            "err".parse::<StatusFilter>().unwrap(),
            StatusFilter::Class(StatusClass::Error)
        );
        assert!("6xx".parse::<StatusFilter>().is_err());
        assert_eq!(
            "Warn".parse::<LevelFilter>().unwrap(),
            LevelFilter::Exact(LogLevel::Warn)
        );
        assert!("verbose".parse::<LevelFilter>().is_err());
    }

    #[test]
    fn server_error_filter_excludes_flagged_errors() {
        let store = store_with(vec![
            start("ok", "GET", "https://x/ok"),
            finish("ok", 200, false),
            start("boom", "GET", "https://x/boom"),
            finish("boom", 503, false),
            start("flagged", "GET", "https://x/flagged"),
            finish("flagged", 500, true),
            start("net", "GET", "https://x/net"),
            finish("net", 0, true),
        ]);

        let five = RequestFilter {
            status: StatusFilter::Class(StatusClass::ServerError),
            ..Default::default()
        };
        assert_eq!(ids(five.apply(&store)), vec!["boom"]);

        let err = RequestFilter {
            status: StatusFilter::Class(StatusClass::Error),
            ..Default::default()
        };
        assert_eq!(ids(err.apply(&store)), vec!["net", "flagged"]);
    }

    #[test]
    fn records_without_status_land_in_error_bucket() {
        let store = store_with(vec![start("p", "GET", "https://x")]);
        assert_eq!(RequestFilter::default().apply(&store).len(), 1);

        let err = RequestFilter {
            status: StatusFilter::Class(StatusClass::Error),
            ..Default::default()
        };
        assert_eq!(ids(err.apply(&store)), vec!["p"]);
    }

    #[test]
    fn criteria_compose_with_and() {
        let store = store_with(vec![
            start("a", "GET", "https://api.example.com/Users"),
            finish("a", 200, false),
            start("b", "POST", "https://api.example.com/users"),
            finish("b", 201, false),
            start("c", "POST", "https://cdn.example.com/img"),
            finish("c", 200, false),
        ]);

        let filter = RequestFilter {
            search: "USERS".into(),
            method: MethodFilter::Exact("POST".into()),
            status: StatusFilter::Class(StatusClass::Success),
        };
        assert_eq!(ids(filter.apply(&store)), vec!["b"]);
    }

    #[test]
    fn log_search_covers_rendered_args() {
        let store = store_with(vec![
            LogEmitted {
                id: "1".into(),
                level: LogLevel::Warn,
                args: vec![json!("cache"), json!({ "key": "Session-42" })],
                timestamp: "t".into(),
                stack: None,
            }
            .into(),
            LogEmitted {
                id: "2".into(),
                level: LogLevel::Info,
                args: vec![json!({ "__type": "Error", "name": "TypeError", "message": "x is undefined" })],
                timestamp: "t".into(),
                stack: None,
            }
            .into(),
        ]);

        let by_text = LogFilter {
            search: "session-42".into(),
            ..Default::default()
        };
        assert_eq!(by_text.apply(&store).len(), 1);

        let by_error = LogFilter {
            search: "typeerror: x".into(),
            level: LevelFilter::Exact(LogLevel::Info),
        };
        assert_eq!(by_error.apply(&store)[0].id.as_str(), "2");

        let wrong_level = LogFilter {
            search: "cache".into(),
            level: LevelFilter::Exact(LogLevel::Error),
        };
        assert!(wrong_level.apply(&store).is_empty());
    }
}
