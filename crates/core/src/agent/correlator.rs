use std::sync::Arc;

use tokio::time::Instant;

use crate::{
    agent::{
        emitter::EventSink,
        headers::RawHeaders,
        metadata::{CallMetadata, CallToken, CompletionHints, CorrelationTable, Recovered},
        snippet::Body,
    },
    config::{AgentSettings, DEFAULT_ID_HEADER, DEFAULT_MAX_BODY_LEN},
    events::{EventId, RequestFinished, RequestStarted, now_timestamp},
};

pub const NETWORK_ERROR: &str = "NETWORK_ERROR";

#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    pub max_body_len: usize,
    pub inject_id_header: bool,
    pub id_header: String,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            max_body_len: DEFAULT_MAX_BODY_LEN,
            inject_id_header: true,
            id_header: DEFAULT_ID_HEADER.to_string(),
        }
    }
}

impl From<&AgentSettings> for CorrelatorConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_body_len: settings.max_body_len,
            inject_id_header: settings.inject_id_header,
            id_header: settings.id_header.clone(),
        }
    }
}

/// Where an outbound call is going, in the shapes call surfaces use.
#[derive(Debug, Clone)]
pub enum CallTarget {
    Text(String),
    Url(reqwest::Url),
    Config {
        url: Option<String>,
        base_url: Option<String>,
    },
}

impl CallTarget {
    /// Config targets concatenate base and path verbatim, without inserting or removing slashes.
    pub fn resolve(&self) -> String {
        match self {
            CallTarget::Text(url) => url.clone(),
            CallTarget::Url(url) => url.to_string(),
            CallTarget::Config { url, base_url } => {
                let path = url.as_deref().unwrap_or_default();
                match base_url {
                    Some(base) => format!("{base}{path}"),
                    None => path.to_string(),
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub target: CallTarget,
    pub method: Option<String>,
    pub headers: RawHeaders,
    pub body: Option<Body>,
}

impl OutboundCall {
    pub fn new(target: CallTarget) -> Self {
        Self {
            target,
            method: None,
            headers: RawHeaders::None,
            body: None,
        }
    }
}

/// What the instrumented call path keeps between start and finish.
#[derive(Debug, Clone)]
pub struct CallHandle {
    pub token: CallToken,
    pub metadata: CallMetadata,
}

impl CallHandle {
    pub fn id(&self) -> &EventId {
        &self.metadata.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseSnapshot {
    pub url: Option<String>,
    pub status: u16,
    pub status_text: Option<String>,
    pub headers: RawHeaders,
    pub body: Option<Body>,
}

/// How an outbound call settled.
#[derive(Debug, Clone)]
pub enum Settlement {
    Response(ResponseSnapshot),
    /// The call failed. `response` is set when the failure still carried an HTTP response.
    Failure {
        message: String,
        response: Option<ResponseSnapshot>,
    },
}

pub struct Correlator {
    table: CorrelationTable,
    sink: Arc<dyn EventSink>,
    config: CorrelatorConfig,
}

impl Correlator {
    pub fn new(sink: Arc<dyn EventSink>, config: CorrelatorConfig) -> Self {
        Self {
            table: CorrelationTable::new(),
            sink,
            config,
        }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    pub fn id_header(&self) -> &str {
        &self.config.id_header
    }

    /// Calls started but not yet settled.
    pub fn in_flight(&self) -> usize {
        self.table.len()
    }

    /// Drop the table entry of a call that ended without a completion being attributed to it.
    pub fn release(&self, token: CallToken) -> bool {
        let Some(metadata) = self.table.release(token) else {
            return false;
        };
        tracing::debug!(id = %metadata.id, url = %metadata.url, "call ended without completion");
        true
    }

    /// Releases `token` when the returned guard goes out of scope, including when the future
    /// driving the call is dropped before it settles.
    pub fn guard(&self, token: CallToken) -> InFlightGuard<'_> {
        InFlightGuard {
            correlator: self,
            token,
        }
    }

    /// Assign an id to `call`, remember it, and emit `RequestStarted`.
    ///
    /// When header injection is on, the id is also written into `call.headers` so it can be
    /// recovered from an echo if the call surface loses everything else.
    pub fn on_call_start(&self, call: &mut OutboundCall) -> CallHandle {
        let id = EventId::generate();
        let url = call.target.resolve();
        let method = call
            .method
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_uppercase();

        if self.config.inject_id_header {
            call.headers.insert(&self.config.id_header, id.as_str());
        }

        let metadata = CallMetadata {
            id: id.clone(),
            url: url.clone(),
            started_at: now_timestamp(),
            start_time: Instant::now(),
        };
        let token = self.table.register(metadata.clone());

        tracing::debug!(%id, %method, %url, "capturing request");
        self.sink.emit(
            RequestStarted {
                id,
                url,
                method,
                request_headers: call.headers.normalize(),
                request_body_snippet: call
                    .body
                    .as_ref()
                    .filter(|b| !b.is_empty())
                    .map(|b| b.snippet(self.config.max_body_len)),
                started_at: metadata.started_at.clone(),
            }
            .into(),
        );

        CallHandle { token, metadata }
    }

    /// Recover the call's id through the fallback chain and emit `RequestFinished`.
    ///
    /// Returns `None` when no id could be recovered; nothing is emitted in that case.
    pub fn on_call_finish(
        &self,
        settlement: Settlement,
        hints: CompletionHints<'_>,
    ) -> Option<EventId> {
        let (snapshot, failure) = match settlement {
            Settlement::Response(snapshot) => (Some(snapshot), None),
            Settlement::Failure { message, response } => (response, Some(message)),
        };

        let response_headers = snapshot.as_ref().and_then(|s| s.headers.normalize());
        let hints = CompletionHints {
            response_headers: hints.response_headers.or(response_headers.as_ref()),
            ..hints
        };

        let Some(Recovered { id, via, metadata }) = self.table.recover(hints, &self.config.id_header)
        else {
            tracing::debug!(
                status = snapshot.as_ref().map(|s| s.status),
                "dropping completion with no recoverable id"
            );
            return None;
        };

        let duration_ms = metadata
            .as_ref()
            .map(|m| m.start_time.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let url = metadata
            .map(|m| m.url)
            .or_else(|| snapshot.as_ref().and_then(|s| s.url.clone()))
            .unwrap_or_default();

        let max_len = self.config.max_body_len;
        let body_snippet = |s: &ResponseSnapshot| {
            s.body
                .as_ref()
                .filter(|b| !b.is_empty())
                .map(|b| b.snippet(max_len))
        };

        let finished = match (snapshot, failure) {
            (Some(snapshot), None) => RequestFinished {
                id: id.clone(),
                url,
                status: snapshot.status,
                status_text: snapshot.status_text.clone(),
                response_body_snippet: body_snippet(&snapshot),
                response_headers,
                duration_ms,
                finished_at: now_timestamp(),
                is_error: false,
                error_message: None,
            },
            (Some(snapshot), Some(message)) => RequestFinished {
                id: id.clone(),
                url,
                status: snapshot.status,
                status_text: Some(
                    snapshot
                        .status_text
                        .clone()
                        .unwrap_or_else(|| NETWORK_ERROR.to_string()),
                ),
                response_body_snippet: body_snippet(&snapshot),
                response_headers,
                duration_ms,
                finished_at: now_timestamp(),
                is_error: true,
                error_message: Some(message),
            },
            (None, message) => RequestFinished {
                id: id.clone(),
                url,
                status: 0,
                status_text: Some(NETWORK_ERROR.to_string()),
                response_headers: None,
                response_body_snippet: None,
                duration_ms,
                finished_at: now_timestamp(),
                is_error: true,
                error_message: message,
            },
        };

        tracing::debug!(
            %id,
            ?via,
            status = finished.status,
            duration_ms,
            is_error = finished.is_error,
            "capturing response"
        );
        self.sink.emit(finished.into());
        Some(id)
    }
}

pub struct InFlightGuard<'a> {
    correlator: &'a Correlator,
    token: CallToken,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.correlator.release(self.token);
    }
}
