//! Instrumentation that runs inside the observed process.

pub mod client;
pub mod console;
pub mod correlator;
pub mod emitter;
pub mod headers;
pub mod interceptor;
pub mod layer;
pub mod metadata;
pub mod snippet;

use std::sync::Arc;

use tokio::task::JoinHandle;

pub use client::InstrumentedClient;
pub use console::{ArgValue, ConsoleCapture, ConsoleSink, LogValue, StderrConsole};
pub use correlator::{Correlator, CorrelatorConfig};
pub use emitter::{Emitter, EventSink, NullSink, TransportState};
pub use interceptor::{CorrelationInterceptor, InterceptedClient, Interceptors, RequestConfig};
pub use layer::{CaptureLayer, SilentConsole};

use crate::config::AgentSettings;

/// Entry point for instrumenting a process: one emitter, one correlator, many surfaces.
pub struct Agent {
    settings: AgentSettings,
    sink: Arc<dyn EventSink>,
    correlator: Arc<Correlator>,
    emitter: Option<Emitter>,
    connection: Option<JoinHandle<()>>,
}

impl Agent {
    /// Connect to the relay named in `settings`. Must be called inside a tokio runtime unless the
    /// agent is disabled.
    pub fn start(settings: AgentSettings) -> Self {
        let (sink, emitter, connection): (Arc<dyn EventSink>, _, _) = if settings.enabled {
            let (emitter, task) = Emitter::connect(&settings.relay_url, settings.send_buffer);
            tracing::info!(relay = %settings.relay_url, "network inspector agent starting");
            (Arc::new(emitter.clone()), Some(emitter), Some(task))
        } else {
            tracing::debug!("network inspector agent disabled");
            (Arc::new(NullSink), None, None)
        };

        let correlator = Arc::new(Correlator::new(
            Arc::clone(&sink),
            CorrelatorConfig::from(&settings),
        ));

        Self {
            settings,
            sink,
            correlator,
            emitter,
            connection,
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// `None` when the agent is disabled.
    pub fn transport_state(&self) -> Option<TransportState> {
        self.emitter.as_ref().map(Emitter::state)
    }

    pub fn emitter(&self) -> Option<&Emitter> {
        self.emitter.as_ref()
    }

    pub fn client(&self) -> InstrumentedClient {
        self.wrap_client(reqwest::Client::new())
    }

    pub fn wrap_client(&self, inner: reqwest::Client) -> InstrumentedClient {
        InstrumentedClient::new(inner, Arc::clone(&self.correlator))
    }

    pub fn interceptor(&self) -> Arc<CorrelationInterceptor> {
        Arc::new(CorrelationInterceptor::new(Arc::clone(&self.correlator)))
    }

    /// Put the correlation interceptor at the front of a client library's chains.
    pub fn instrument(&self, interceptors: &mut Interceptors) {
        interceptors.instrument(self.interceptor());
    }

    pub fn console(&self) -> ConsoleCapture {
        self.console_over(Arc::new(StderrConsole))
    }

    pub fn console_over(&self, original: Arc<dyn ConsoleSink>) -> ConsoleCapture {
        ConsoleCapture::new(original, Arc::clone(&self.sink))
            .with_stack_traces(self.settings.capture_stack_trace)
    }

    pub fn capture_layer(&self) -> CaptureLayer {
        CaptureLayer::new(self.console_over(Arc::new(SilentConsole)))
    }

    /// Stop the background connection. Events emitted afterwards are discarded.
    pub fn shutdown(&mut self) {
        if let Some(emitter) = &self.emitter {
            emitter.close();
        }
        if let Some(task) = self.connection.take() {
            task.abort();
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.shutdown();
    }
}
