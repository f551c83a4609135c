use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::{
    events::EnrichedEvent,
    store::{IngestOutcome, SharedSession},
    workers::Worker,
};

/// What the ingest worker did with one event, for observers such as a live tail.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub event: Arc<EnrichedEvent>,
    pub outcome: IngestOutcome,
}

/// The only writer of session records. Serializes every ingest through one task.
pub struct SessionIngestWorker {
    session: SharedSession,
    observer: Option<mpsc::UnboundedSender<Ingested>>,
}

impl SessionIngestWorker {
    pub fn new(session: SharedSession) -> Self {
        Self {
            session,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<Ingested>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl Worker for SessionIngestWorker {
    const SUBSCRIBER_ID: &'static str = "session.ingest";

    async fn handle(&mut self, event: Arc<EnrichedEvent>) -> Result<()> {
        let outcome = self.session.ingest(event.event.clone());
        tracing::trace!(
            id = %event.event.id(),
            kind = event.event.event_type(),
            seq = event.ingest_seq,
            ?outcome,
            "ingested"
        );

        if let Some(observer) = &self.observer {
            if observer.send(Ingested { event, outcome }).is_err() {
                tracing::debug!("ingest observer went away, ingesting without it");
                self.observer = None;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::{EventId, RequestFinished, RequestStarted},
        relay::{InspectorEndpoint, RelayMetrics},
        store::RecordState,
    };
    use tokio::sync::broadcast;
    use uuid::Uuid;

    #[tokio::test]
    async fn worker_merges_relayed_events_into_session() {
        let endpoint = InspectorEndpoint::new(Arc::new(RelayMetrics::new()));
        let subscription = endpoint.subscribe();
        let session = SharedSession::new();
        let (observer_tx, mut observer_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let worker = SessionIngestWorker::new(session.clone()).with_observer(observer_tx);
        let task = tokio::spawn(worker.run(subscription, shutdown_rx));

        let conn = Uuid::new_v4();
        endpoint.forward(
            RequestFinished {
                id: EventId::from("a"),
                url: "https://x".into(),
                status: 200,
                status_text: None,
                response_headers: None,
                response_body_snippet: None,
                duration_ms: 3,
                finished_at: "f".into(),
                is_error: false,
                error_message: None,
            }
            .into(),
            conn,
        );
        endpoint.forward(
            RequestStarted {
                id: EventId::from("a"),
                url: "https://x".into(),
                method: "GET".into(),
                request_headers: None,
                request_body_snippet: None,
                started_at: "s".into(),
            }
            .into(),
            conn,
        );

        let first = observer_rx.recv().await.unwrap();
        let second = observer_rx.recv().await.unwrap();
        assert_eq!(first.outcome, IngestOutcome::Inserted);
        assert_eq!(second.outcome, IngestOutcome::Merged);

        let state = session.read(|store| store.request(&"a".into()).map(|r| r.state()));
        assert_eq!(state, Some(RecordState::Complete));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    fn relayed(id: &str) -> Arc<EnrichedEvent> {
        let event = crate::events::Event::from(RequestStarted {
            id: EventId::from(id),
            url: "https://x".into(),
            method: "GET".into(),
            request_headers: None,
            request_body_snippet: None,
            started_at: "s".into(),
        });
        Arc::new(EnrichedEvent {
            event,
            frame: Arc::from("{}"),
            connection_id: Uuid::new_v4(),
            ingest_seq: 0,
            received_at: tokio::time::Instant::now(),
        })
    }

    #[tokio::test]
    async fn closed_observer_is_dropped_and_ingest_continues() {
        let session = SharedSession::new();
        let (observer_tx, observer_rx) = mpsc::unbounded_channel();
        drop(observer_rx);
        let mut worker = SessionIngestWorker::new(session.clone()).with_observer(observer_tx);

        worker.handle(relayed("a")).await.unwrap();
        assert!(worker.observer.is_none());
        worker.handle(relayed("b")).await.unwrap();

        assert_eq!(session.read(|store| store.request_count()), 2);
    }
}
