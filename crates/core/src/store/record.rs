use serde::Serialize;

use crate::events::{EventId, Headers, LogEmitted, RequestFinished, RequestStarted, now_timestamp};

pub const UNKNOWN_METHOD: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Request seen, response not yet.
    Pending,
    /// Response seen without its request.
    Orphan,
    Complete,
}

/// One outbound call as the inspector knows it: the merge of its request and response events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: EventId,
    pub url: String,
    pub method: String,
    pub request_headers: Option<Headers>,
    pub request_body_snippet: Option<String>,
    pub started_at: String,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub response_headers: Option<Headers>,
    pub response_body_snippet: Option<String>,
    pub duration_ms: Option<u64>,
    pub finished_at: Option<String>,
    pub is_error: Option<bool>,
    pub error_message: Option<String>,
    #[serde(skip)]
    has_request: bool,
}

impl RequestRecord {
    pub fn pending(started: RequestStarted) -> Self {
        let mut record = Self {
            id: started.id.clone(),
            url: String::new(),
            method: String::new(),
            request_headers: None,
            request_body_snippet: None,
            started_at: String::new(),
            status: None,
            status_text: None,
            response_headers: None,
            response_body_snippet: None,
            duration_ms: None,
            finished_at: None,
            is_error: None,
            error_message: None,
            has_request: false,
        };
        record.apply_request(started);
        record
    }

    /// A response with no known request. The start time is unknown, so the finish time stands in.
    pub fn orphan(mut finished: RequestFinished) -> Self {
        if finished.finished_at.is_empty() {
            finished.finished_at = now_timestamp();
        }
        let mut record = Self {
            id: finished.id.clone(),
            url: finished.url.clone(),
            method: UNKNOWN_METHOD.to_string(),
            request_headers: None,
            request_body_snippet: None,
            started_at: finished.finished_at.clone(),
            status: None,
            status_text: None,
            response_headers: None,
            response_body_snippet: None,
            duration_ms: None,
            finished_at: None,
            is_error: None,
            error_message: None,
            has_request: false,
        };
        record.apply_response(finished);
        record
    }

    /// Overwrite the request side. Response fields are left alone. A missing method or start time
    /// is filled in so the record stays presentable.
    pub fn apply_request(&mut self, started: RequestStarted) {
        self.url = started.url;
        self.method = if started.method.is_empty() {
            UNKNOWN_METHOD.to_string()
        } else {
            started.method
        };
        self.request_headers = started.request_headers;
        self.request_body_snippet = started.request_body_snippet;
        self.started_at = if started.started_at.is_empty() {
            now_timestamp()
        } else {
            started.started_at
        };
        self.has_request = true;
    }

    /// Merge the response side. The request's url wins over the response's.
    pub fn apply_response(&mut self, finished: RequestFinished) {
        self.status = Some(finished.status);
        self.status_text = finished.status_text;
        self.response_headers = finished.response_headers;
        self.response_body_snippet = finished.response_body_snippet;
        self.duration_ms = Some(finished.duration_ms);
        self.finished_at = Some(if finished.finished_at.is_empty() {
            now_timestamp()
        } else {
            finished.finished_at
        });
        self.is_error = Some(finished.is_error);
        self.error_message = finished.error_message;
    }

    pub fn state(&self) -> RecordState {
        match (self.has_request, self.finished_at.is_some()) {
            (true, false) => RecordState::Pending,
            (false, _) => RecordState::Orphan,
            (true, true) => RecordState::Complete,
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

/// A console event as stored. Never modified after ingest.
pub type LogRecord = LogEmitted;
