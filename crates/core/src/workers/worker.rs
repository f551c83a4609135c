use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;

use crate::{events::EnrichedEvent, relay::Subscription};

/// A consumer of relayed events. Handler errors are logged and the loop keeps going.
pub trait Worker: Send + Sized + 'static {
    const SUBSCRIBER_ID: &'static str;

    async fn handle(&mut self, event: Arc<EnrichedEvent>) -> Result<()>;

    async fn run(
        mut self,
        mut inputs: Subscription,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                event = inputs.recv() => match event {
                    Some(event) => {
                        let event_id = event.event.id().clone();
                        if let Err(e) = self.handle(event).await {
                            tracing::warn!(
                                worker = Self::SUBSCRIBER_ID,
                                %event_id,
                                error = %e,
                                "handler failed"
                            );
                        }
                    }
                    None => {
                        tracing::debug!(worker = Self::SUBSCRIBER_ID, "subscription closed");
                        return Ok(());
                    }
                },
            }
        }
    }
}
