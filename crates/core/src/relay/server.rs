use std::{
    net::SocketAddr,
    sync::{Arc, atomic::Ordering},
};

use futures_util::StreamExt;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

use crate::{
    error::{NetscopeError, Result},
    relay::{InspectorEndpoint, RelayMetrics},
};

/// WebSocket server that agents connect to.
pub struct Relay {
    listener: TcpListener,
    endpoint: InspectorEndpoint,
}

impl Relay {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener =
            TcpListener::bind(addr)
                .await
                .map_err(|e| NetscopeError::BindFailed {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                })?;

        tracing::info!(addr = %listener.local_addr()?, "relay listening");

        Ok(Self {
            listener,
            endpoint: InspectorEndpoint::new(Arc::new(RelayMetrics::new())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn endpoint(&self) -> &InspectorEndpoint {
        &self.endpoint
    }

    /// Accept connections until `shutdown` fires. Each connection runs on its own task and
    /// stops on the same signal.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("relay shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    let endpoint = self.endpoint.clone();
                    let shutdown = shutdown.resubscribe();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, endpoint, shutdown).await {
                            tracing::warn!(%peer, error = %e, "agent connection ended with error");
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    endpoint: InspectorEndpoint,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut socket = accept_async(stream).await?;
    let connection_id = Uuid::new_v4();
    endpoint
        .metrics()
        .connections_total
        .fetch_add(1, Ordering::Relaxed);
    tracing::info!(%peer, %connection_id, "agent connected");

    loop {
        let message = tokio::select! {
            _ = shutdown.recv() => break,
            message = socket.next() => message,
        };

        let frame = match message {
            Some(Ok(Message::Text(text))) => text.to_string(),
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        };

        if let Err(e) = endpoint.forward_frame(&frame, connection_id) {
            tracing::warn!(%connection_id, error = %e, "discarding malformed frame");
        }
    }

    tracing::info!(%peer, %connection_id, "agent disconnected");
    Ok(())
}
