use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use tokio::{sync::mpsc, time::Instant};
use uuid::Uuid;

use crate::{
    error::Result,
    events::{EnrichedEvent, Event},
};

#[derive(Debug, Default)]
pub struct RelayMetrics {
    pub connections_total: AtomicU64,
    pub forwarded_total: AtomicU64,
    pub unsubscribed_drops_total: AtomicU64,
    pub malformed_total: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RelayCounters {
        RelayCounters {
            connections: self.connections_total.load(Ordering::Relaxed),
            forwarded: self.forwarded_total.load(Ordering::Relaxed),
            dropped: self.unsubscribed_drops_total.load(Ordering::Relaxed),
            malformed: self.malformed_total.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayCounters {
    pub connections: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub malformed: u64,
}

pub type Subscription = mpsc::UnboundedReceiver<Arc<EnrichedEvent>>;

/// The single place relayed events go. At most one subscriber at a time.
#[derive(Clone)]
pub struct InspectorEndpoint {
    inner: Arc<EndpointInner>,
}

struct EndpointInner {
    next_ingest_seq: AtomicU64,
    subscriber: Mutex<Option<mpsc::UnboundedSender<Arc<EnrichedEvent>>>>,
    metrics: Arc<RelayMetrics>,
}

impl InspectorEndpoint {
    pub fn new(metrics: Arc<RelayMetrics>) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                next_ingest_seq: AtomicU64::new(0),
                subscriber: Mutex::new(None),
                metrics,
            }),
        }
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.inner.metrics
    }

    /// Start receiving events. Replaces any previous subscriber, whose stream then ends.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .inner
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(tx);
        if previous.is_some() {
            tracing::debug!("replacing existing inspector subscriber");
        }
        rx
    }

    pub fn unsubscribe(&self) {
        self.inner
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Decode a frame from an agent and forward it with its original text.
    ///
    /// Frames that do not decode are rejected and counted as malformed.
    pub fn forward_frame(&self, frame: &str, connection_id: Uuid) -> Result<bool> {
        let event = match Event::decode(frame) {
            Ok(event) => event,
            Err(e) => {
                self.inner.metrics.malformed_total.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        Ok(self.deliver(event, Arc::from(frame), connection_id))
    }

    /// Hand `event` to the subscriber, or drop it when nobody is listening.
    pub fn forward(&self, event: Event, connection_id: Uuid) -> bool {
        let frame = event.encode().unwrap_or_default();
        self.deliver(event, Arc::from(frame), connection_id)
    }

    fn deliver(&self, event: Event, frame: Arc<str>, connection_id: Uuid) -> bool {
        let ingest_seq = self.inner.next_ingest_seq.fetch_add(1, Ordering::Relaxed);
        let enriched = Arc::new(EnrichedEvent {
            event,
            frame,
            connection_id,
            ingest_seq,
            received_at: Instant::now(),
        });

        let mut subscriber = self
            .inner
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let delivered = match subscriber.as_ref() {
            Some(tx) => tx.send(enriched).is_ok(),
            None => false,
        };

        if delivered {
            self.inner.metrics.forwarded_total.fetch_add(1, Ordering::Relaxed);
        } else {
            // A receiver that went away counts as unsubscribed.
            if subscriber.as_ref().is_some_and(|tx| tx.is_closed()) {
                subscriber.take();
            }
            self.inner
                .metrics
                .unsubscribed_drops_total
                .fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }
}
