use std::{collections::HashMap, fmt};

use crate::{
    events::LogLevel,
    query::StatusClass,
    store::{RecordState, SessionStore},
};

/// Counts per status bucket and log level, for the inspector's exit report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub requests: usize,
    pub pending: usize,
    pub orphans: usize,
    /// Settled records only; pending ones are counted in `pending`.
    pub by_status: HashMap<StatusClass, usize>,
    pub logs: usize,
    pub by_level: HashMap<LogLevel, usize>,
}

impl SessionSummary {
    pub fn of(store: &SessionStore) -> Self {
        let mut summary = SessionSummary {
            requests: store.request_count(),
            logs: store.log_count(),
            ..Default::default()
        };

        for record in store.requests_newest_first() {
            match record.state() {
                RecordState::Pending => summary.pending += 1,
                RecordState::Orphan => summary.orphans += 1,
                RecordState::Complete => {}
            }
            if record.state() != RecordState::Pending {
                *summary.by_status.entry(StatusClass::of(record)).or_default() += 1;
            }
        }

        for log in store.logs_newest_first() {
            *summary.by_level.entry(log.level).or_default() += 1;
        }

        summary
    }

    pub fn status_count(&self, class: StatusClass) -> usize {
        self.by_status.get(&class).copied().unwrap_or(0)
    }

    pub fn level_count(&self, level: LogLevel) -> usize {
        self.by_level.get(&level).copied().unwrap_or(0)
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requests ({} pending, {} orphaned)",
            self.requests, self.pending, self.orphans
        )?;
        for class in StatusClass::ALL {
            write!(f, " {class}={}", self.status_count(class))?;
        }
        write!(f, "; {} logs", self.logs)?;
        for level in LogLevel::ALL {
            let count = self.level_count(level);
            if count > 0 {
                write!(f, " {level}={count}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LogEmitted, RequestFinished, RequestStarted};

    #[test]
    fn counts_settled_requests_by_bucket() {
        let mut store = SessionStore::new();
        store.ingest(
            RequestStarted {
                id: "p".into(),
                url: "https://x".into(),
                method: "GET".into(),
                request_headers: None,
                request_body_snippet: None,
                started_at: "s".into(),
            }
            .into(),
        );
        for (id, status, is_error) in [("a", 200, false), ("b", 500, false), ("c", 0, true)] {
            store.ingest(
                RequestFinished {
                    id: id.into(),
                    url: "https://x".into(),
                    status,
                    status_text: None,
                    response_headers: None,
                    response_body_snippet: None,
                    duration_ms: 0,
                    finished_at: "f".into(),
                    is_error,
                    error_message: None,
                }
                .into(),
            );
        }
        store.ingest(
            LogEmitted {
                id: "l".into(),
                level: LogLevel::Error,
                args: vec![],
                timestamp: "t".into(),
                stack: None,
            }
            .into(),
        );

        let summary = SessionSummary::of(&store);
        assert_eq!(summary.requests, 4);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.orphans, 3);
        assert_eq!(summary.status_count(StatusClass::Success), 1);
        assert_eq!(summary.status_count(StatusClass::ServerError), 1);
        assert_eq!(summary.status_count(StatusClass::Error), 1);
        assert_eq!(summary.level_count(LogLevel::Error), 1);
        assert!(summary.to_string().contains("5xx=1"));
    }
}
