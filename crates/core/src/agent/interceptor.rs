use std::{collections::BTreeMap, sync::Arc};

use crate::{
    agent::{
        correlator::{CallTarget, Correlator, OutboundCall, ResponseSnapshot, Settlement},
        headers::RawHeaders,
        metadata::{CallMetadata, CallToken, CompletionHints},
        snippet::Body,
    },
    events::stringify_header_value,
};

/// Request configuration for a client library that runs interceptors around its transport.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub url: Option<String>,
    pub base_url: Option<String>,
    pub method: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub data: Option<Body>,
    /// Set by the correlation interceptor; transports that rebuild the config drop it.
    pub call_token: Option<CallToken>,
    /// Copy of the correlation metadata carried on the config itself.
    pub metadata: Option<CallMetadata>,
}

impl RequestConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn full_url(&self) -> String {
        self.target().resolve()
    }

    fn target(&self) -> CallTarget {
        CallTarget::Config {
            url: self.url.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallResponse {
    /// The config the response was produced for, if the transport kept it.
    pub config: Option<RequestConfig>,
    pub status: u16,
    pub status_text: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub data: Option<Body>,
}

#[derive(Debug, Clone)]
pub struct CallFailure {
    pub config: Option<RequestConfig>,
    /// Present when the failure is an HTTP error status rather than a transport failure.
    pub response: Option<CallResponse>,
    pub message: String,
}

pub trait RequestInterceptor: Send + Sync {
    fn on_request(&self, config: &mut RequestConfig);
}

pub trait ResponseInterceptor: Send + Sync {
    fn on_response(&self, response: &CallResponse);
    fn on_error(&self, failure: &CallFailure);

    /// The call tagged with `token` is over, whether or not a response reached this chain.
    fn on_release(&self, _token: CallToken) {}
}

/// Ordered interceptor lists a client library consults around every call.
#[derive(Default, Clone)]
pub struct Interceptors {
    request: Vec<Arc<dyn RequestInterceptor>>,
    response: Vec<Arc<dyn ResponseInterceptor>>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_request(&mut self, interceptor: Arc<dyn RequestInterceptor>) -> &mut Self {
        self.request.push(interceptor);
        self
    }

    pub fn use_response(&mut self, interceptor: Arc<dyn ResponseInterceptor>) -> &mut Self {
        self.response.push(interceptor);
        self
    }

    /// Install the correlation interceptor ahead of everything already registered, so it sees
    /// the config before other interceptors rewrite it and the response before they consume it.
    pub fn instrument(&mut self, correlation: Arc<CorrelationInterceptor>) -> &mut Self {
        self.request.insert(0, correlation.clone());
        self.response.insert(0, correlation);
        self
    }

    pub fn run_request(&self, config: &mut RequestConfig) {
        for interceptor in &self.request {
            interceptor.on_request(config);
        }
    }

    pub fn run_response(&self, response: &CallResponse) {
        for interceptor in &self.response {
            interceptor.on_response(response);
        }
    }

    pub fn run_error(&self, failure: &CallFailure) {
        for interceptor in &self.response {
            interceptor.on_error(failure);
        }
    }

    pub fn release(&self, token: CallToken) {
        for interceptor in &self.response {
            interceptor.on_release(token);
        }
    }
}

/// Releases the call's token through the response chain once the request scope ends.
struct ReleaseOnDrop<'a> {
    interceptors: &'a Interceptors,
    token: Option<CallToken>,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token {
            self.interceptors.release(token);
        }
    }
}

/// Sends a prepared config over the wire.
pub trait Transport {
    async fn send(&self, config: RequestConfig) -> Result<CallResponse, CallFailure>;
}

/// A client library shell: interceptors around a transport, errors passed back untouched.
pub struct InterceptedClient<T> {
    pub interceptors: Interceptors,
    transport: T,
}

impl<T: Transport> InterceptedClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            interceptors: Interceptors::new(),
            transport,
        }
    }

    pub async fn request(&self, mut config: RequestConfig) -> Result<CallResponse, CallFailure> {
        self.interceptors.run_request(&mut config);
        let _release = ReleaseOnDrop {
            interceptors: &self.interceptors,
            token: config.call_token,
        };
        match self.transport.send(config).await {
            Ok(response) => {
                self.interceptors.run_response(&response);
                Ok(response)
            }
            Err(failure) => {
                self.interceptors.run_error(&failure);
                Err(failure)
            }
        }
    }
}

pub struct CorrelationInterceptor {
    correlator: Arc<Correlator>,
}

impl CorrelationInterceptor {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self { correlator }
    }

    fn finish(
        &self,
        config: Option<&RequestConfig>,
        settlement: Settlement,
        response_headers: Option<&BTreeMap<String, String>>,
    ) {
        let request_headers = config.map(|c| lower_case_keys(&c.headers));
        let response_headers = response_headers.map(lower_case_keys);

        let hints = CompletionHints {
            token: config.and_then(|c| c.call_token),
            stashed: config.and_then(|c| c.metadata.as_ref()),
            request_headers: request_headers.as_ref(),
            response_headers: response_headers.as_ref(),
        };

        self.correlator.on_call_finish(settlement, hints);
    }
}

impl RequestInterceptor for CorrelationInterceptor {
    fn on_request(&self, config: &mut RequestConfig) {
        let mut call = OutboundCall {
            target: config.target(),
            method: config.method.clone(),
            headers: RawHeaders::Mapping(
                config
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect(),
            ),
            body: config.data.clone(),
        };

        let handle = self.correlator.on_call_start(&mut call);

        if let RawHeaders::Mapping(headers) = call.headers {
            config.headers = headers
                .iter()
                .map(|(k, v)| (k.clone(), stringify_header_value(v)))
                .collect();
        }
        config.call_token = Some(handle.token);
        config.metadata = Some(handle.metadata);
    }
}

impl ResponseInterceptor for CorrelationInterceptor {
    fn on_response(&self, response: &CallResponse) {
        self.finish(
            response.config.as_ref(),
            Settlement::Response(snapshot(response)),
            Some(&response.headers),
        );
    }

    fn on_error(&self, failure: &CallFailure) {
        self.finish(
            failure.config.as_ref(),
            Settlement::Failure {
                message: failure.message.clone(),
                response: failure.response.as_ref().map(snapshot),
            },
            failure.response.as_ref().map(|r| &r.headers),
        );
    }

    fn on_release(&self, token: CallToken) {
        self.correlator.release(token);
    }
}

fn snapshot(response: &CallResponse) -> ResponseSnapshot {
    ResponseSnapshot {
        url: response.config.as_ref().map(RequestConfig::full_url),
        status: response.status,
        status_text: response.status_text.clone(),
        headers: RawHeaders::Pairs(
            response
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        body: response.data.clone(),
    }
}

fn lower_case_keys(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}
