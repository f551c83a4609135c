use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicU64, Ordering},
};

use futures_util::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::events::Event;

/// Where instrumentation hands finished events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Discards everything; used when the agent is disabled.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Open,
    Closed,
}

impl TransportState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransportState::Connecting,
            1 => TransportState::Open,
            _ => TransportState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TransportState::Connecting => 0,
            TransportState::Open => 1,
            TransportState::Closed => 2,
        }
    }
}

#[derive(Default)]
pub struct EmitterMetrics {
    pub sent_total: AtomicU64,
    pub dropped_total: AtomicU64,
}

/// Fire-and-forget WebSocket emitter. Frames are only accepted while the socket is open.
#[derive(Clone)]
pub struct Emitter {
    state: Arc<AtomicU8>,
    frames: mpsc::Sender<String>,
    metrics: Arc<EmitterMetrics>,
}

impl Emitter {
    /// Start connecting to `url` in the background. The emitter is usable immediately;
    /// events emitted before the socket opens are discarded.
    pub fn connect(url: &str, send_buffer: usize) -> (Emitter, JoinHandle<()>) {
        let (frames_tx, frames_rx) = mpsc::channel::<String>(send_buffer.max(1));
        let state = Arc::new(AtomicU8::new(TransportState::Connecting.as_u8()));
        let metrics = Arc::new(EmitterMetrics::default());

        let task = tokio::spawn(run_connection(
            url.to_string(),
            Arc::clone(&state),
            Arc::clone(&metrics),
            frames_rx,
        ));

        (
            Emitter {
                state,
                frames: frames_tx,
                metrics,
            },
            task,
        )
    }

    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Mark the transport closed. Later events are discarded without touching the channel.
    pub fn close(&self) {
        self.state
            .store(TransportState::Closed.as_u8(), Ordering::Release);
    }

    pub fn metrics(&self) -> &EmitterMetrics {
        &self.metrics
    }

    fn drop_frame(&self) {
        self.metrics.dropped_total.fetch_add(1, Ordering::Relaxed);
    }
}

impl EventSink for Emitter {
    fn emit(&self, event: Event) {
        if self.state() != TransportState::Open {
            self.drop_frame();
            return;
        }

        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize event");
                self.drop_frame();
                return;
            }
        };

        if self.frames.try_send(frame).is_err() {
            self.drop_frame();
        }
    }
}

async fn run_connection(
    url: String,
    state: Arc<AtomicU8>,
    metrics: Arc<EmitterMetrics>,
    mut frames: mpsc::Receiver<String>,
) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(e) => {
            tracing::warn!(%url, error = %e, "could not connect to inspector");
            state.store(TransportState::Closed.as_u8(), Ordering::Release);
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    let opened = state.compare_exchange(
        TransportState::Connecting.as_u8(),
        TransportState::Open.as_u8(),
        Ordering::AcqRel,
        Ordering::Acquire,
    );
    if opened.is_err() {
        // Closed while the handshake was in flight.
        let _ = sink.close().await;
        return;
    }
    tracing::info!(%url, "connected to inspector");

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    tracing::warn!(error = %e, "send to inspector failed");
                    break;
                }
                metrics.sent_total.fetch_add(1, Ordering::Relaxed);
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("inspector closed the connection");
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "inspector connection error");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    state.store(TransportState::Closed.as_u8(), Ordering::Release);
    let _ = sink.close().await;
}
