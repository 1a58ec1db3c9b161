//! Listener-side session lifecycle.
//!
//! `SessionListener` does not own sockets; the application's accept loop
//! hands each freshly accepted byte stream to [`SessionListener::accept_stream`],
//! which runs the handshake (when secure mode is requested), registers the
//! endpoint, and announces it. Disconnects flow back through the event
//! channel; [`SessionListener::reaper`] turns them into registry removals.

use std::future::Future;
use std::sync::Arc;

use lockline_crypto::{ExchangeKeyPair, DEFAULT_EXCHANGE_KEY_BITS};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::endpoint::{Endpoint, EndpointState};
use crate::error::TransportError;
use crate::events::{SessionEvent, SessionEvents};
use crate::handshake::HandshakeCoordinator;
use crate::registry::SessionRegistry;

/// Accepts connections into registered sessions.
pub struct SessionListener<S> {
    coordinator: Option<HandshakeCoordinator>,
    registry: Arc<SessionRegistry<S>>,
    events: SessionEvents,
}

impl<S> SessionListener<S>
where
    S: AsyncRead + AsyncWrite + Send + Sync + 'static,
{
    /// Secure mode with the default 4096-bit exchange keypair.
    pub async fn secure() -> Result<Self, TransportError> {
        Self::with_key_bits(DEFAULT_EXCHANGE_KEY_BITS).await
    }

    /// Secure mode with an explicit exchange key size.
    ///
    /// Keypair generation is CPU-heavy, so it runs off the async threads.
    /// The keypair lives for this listener's lifetime and is shared by all
    /// of its handshakes.
    pub async fn with_key_bits(bits: usize) -> Result<Self, TransportError> {
        let keys = tokio::task::spawn_blocking(move || ExchangeKeyPair::generate(bits))
            .await
            .map_err(|e| TransportError::Internal(e.to_string()))??;
        info!(bits, "exchange keypair ready");
        Ok(Self {
            coordinator: Some(HandshakeCoordinator::new(Arc::new(keys))),
            registry: Arc::new(SessionRegistry::new()),
            events: SessionEvents::new(),
        })
    }

    /// Plaintext mode: accepted endpoints carry no credentials and no
    /// session id.
    pub fn plaintext() -> Self {
        Self {
            coordinator: None,
            registry: Arc::new(SessionRegistry::new()),
            events: SessionEvents::new(),
        }
    }

    /// Take ownership of an accepted byte stream: handshake (if secure),
    /// register, announce. On handshake failure the endpoint is closed and
    /// the error propagates; nothing is registered.
    pub async fn accept_stream(&self, stream: S) -> Result<Arc<Endpoint<S>>, TransportError> {
        let endpoint = match &self.coordinator {
            Some(coordinator) => {
                let mut endpoint = Endpoint::new(stream, self.events.clone());
                if let Err(e) = coordinator.accept(&mut endpoint).await {
                    warn!(endpoint = endpoint.id(), error = %e, "handshake failed");
                    endpoint.close().await;
                    return Err(e);
                }
                endpoint
            }
            None => Endpoint::plaintext(stream, self.events.clone()),
        };

        let endpoint = Arc::new(endpoint);
        self.registry.add(Arc::clone(&endpoint)).await;
        self.events.emit(SessionEvent::Connected {
            endpoint: endpoint.id(),
            session_id: endpoint.session_id(),
        });
        Ok(endpoint)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<S>> {
        &self.registry
    }

    /// Register an observer for connect/disconnect notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Future that removes endpoints from the registry as their disconnect
    /// notifications arrive. Spawn it alongside the accept loop; it finishes
    /// when the listener (and thus the event channel) is dropped.
    pub fn reaper(&self) -> impl Future<Output = ()> + Send {
        let registry = Arc::clone(&self.registry);
        let mut rx = self.events.subscribe();
        async move {
            loop {
                match rx.recv().await {
                    Ok(SessionEvent::Disconnected { endpoint, .. }) => {
                        registry.remove_endpoint(endpoint).await;
                    }
                    Ok(SessionEvent::Connected { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // The dropped events may include disconnects, so the
                        // registry is swept for closed endpoints instead of
                        // leaking them.
                        warn!(skipped, "event reaper lagged, sweeping closed endpoints");
                        registry
                            .remove(|e| e.state() == EndpointState::Closed)
                            .await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    #[tokio::test]
    async fn test_lagged_reaper_sweeps_closed_endpoints() {
        let listener: SessionListener<DuplexStream> = SessionListener::plaintext();
        let (server_io, _client_io) = tokio::io::duplex(64);
        let endpoint = listener.accept_stream(server_io).await.unwrap();
        assert_eq!(listener.registry().len().await, 1);

        // Subscribe the reaper first, then overflow the channel so its
        // receiver lags and the disconnect event is among the dropped ones.
        let reaper = listener.reaper();
        endpoint.close().await;
        for _ in 0..128 {
            listener.events.emit(SessionEvent::Connected {
                endpoint: endpoint.id(),
                session_id: None,
            });
        }
        let reaper = tokio::spawn(reaper);

        let mut emptied = false;
        for _ in 0..50 {
            if listener.registry().is_empty().await {
                emptied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(emptied, "lagged reaper never swept the closed endpoint");
        reaper.abort();
    }
}
