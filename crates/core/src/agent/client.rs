use std::sync::Arc;

use reqwest::{IntoUrl, Method, Request, RequestBuilder, ResponseBuilderExt};

use crate::agent::{
    correlator::{CallTarget, Correlator, OutboundCall, ResponseSnapshot, Settlement},
    headers::RawHeaders,
    metadata::CompletionHints,
    snippet::Body,
};

/// `reqwest::Client` decorator that reports every call it executes.
///
/// The response body is read once for the snippet and handed back to the caller inside a
/// rebuilt `reqwest::Response`, so application code reads it as usual. A call whose future is
/// dropped before it settles (a timeout, a lost `select!` branch) leaves no table entry behind.
#[derive(Clone)]
pub struct InstrumentedClient {
    inner: reqwest::Client,
    correlator: Arc<Correlator>,
}

impl InstrumentedClient {
    pub fn new(inner: reqwest::Client, correlator: Arc<Correlator>) -> Self {
        Self { inner, correlator }
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.inner.get(url)
    }

    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.inner.post(url)
    }

    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.inner.request(method, url)
    }

    /// Build `builder` and execute it through the instrumentation.
    pub async fn send(&self, builder: RequestBuilder) -> reqwest::Result<reqwest::Response> {
        self.execute(builder.build()?).await
    }

    pub async fn execute(&self, mut request: Request) -> reqwest::Result<reqwest::Response> {
        let mut call = OutboundCall {
            target: CallTarget::Url(request.url().clone()),
            method: Some(request.method().as_str().to_string()),
            headers: RawHeaders::Collection(std::mem::take(request.headers_mut())),
            body: request
                .body()
                .map(|b| b.as_bytes().map(Body::from_bytes).unwrap_or(Body::Stream)),
        };

        let handle = self.correlator.on_call_start(&mut call);
        if let RawHeaders::Collection(headers) = call.headers {
            *request.headers_mut() = headers;
        }
        let _in_flight = self.correlator.guard(handle.token);
        let hints = CompletionHints::token(handle.token);

        let response = match self.inner.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                self.correlator.on_call_finish(
                    Settlement::Failure {
                        message: e.to_string(),
                        response: None,
                    },
                    hints,
                );
                return Err(e);
            }
        };

        let status = response.status();
        let version = response.version();
        let url = response.url().clone();
        let headers = response.headers().clone();

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.correlator.on_call_finish(
                    Settlement::Failure {
                        message: e.to_string(),
                        response: Some(ResponseSnapshot {
                            url: Some(url.to_string()),
                            status: status.as_u16(),
                            status_text: status.canonical_reason().map(str::to_string),
                            headers: RawHeaders::Collection(headers),
                            body: None,
                        }),
                    },
                    hints,
                );
                return Err(e);
            }
        };

        self.correlator.on_call_finish(
            Settlement::Response(ResponseSnapshot {
                url: Some(url.to_string()),
                status: status.as_u16(),
                status_text: status.canonical_reason().map(str::to_string),
                headers: RawHeaders::Collection(headers.clone()),
                body: Some(Body::from_bytes(&bytes)),
            }),
            hints,
        );

        let (mut parts, ()) = http::Response::builder()
            .url(url)
            .body(())
            .unwrap_or_default()
            .into_parts();
        parts.status = status;
        parts.version = version;
        parts.headers = headers;

        Ok(reqwest::Response::from(http::Response::from_parts(
            parts,
            bytes.to_vec(),
        )))
    }
}
