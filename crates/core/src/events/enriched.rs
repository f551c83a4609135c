use std::sync::Arc;

use tokio::time::Instant;
use uuid::Uuid;

use crate::events::Event;

/// An event as the relay received it, tagged with where and when it arrived.
#[derive(Debug, Clone)]
pub struct EnrichedEvent {
    pub event: Event,
    /// The frame exactly as the agent sent it, including fields `event` does not model.
    pub frame: Arc<str>,
    pub connection_id: Uuid,
    pub ingest_seq: u64,
    pub received_at: Instant,
}
