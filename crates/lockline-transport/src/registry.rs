//! The listener's collection of live endpoints.
//!
//! Membership is mutated only by the listener's accept path and the removal
//! API (driven by disconnect notifications or explicit administrative
//! calls). Insertion order is preserved; no further ordering is meaningful.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::endpoint::{Endpoint, EndpointId};

/// Insertion-ordered set of live endpoints.
#[derive(Debug)]
pub struct SessionRegistry<S> {
    endpoints: RwLock<Vec<Arc<Endpoint<S>>>>,
}

impl<S> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            endpoints: RwLock::new(Vec::new()),
        }
    }

    /// Register an endpoint.
    ///
    /// No two live entries may share a session identifier: a stale entry
    /// with the same session id is evicted first. Entries without a session
    /// id (plaintext mode) never conflict.
    pub async fn add(&self, endpoint: Arc<Endpoint<S>>) {
        let mut endpoints = self.endpoints.write().await;
        if let Some(session_id) = endpoint.session_id() {
            endpoints.retain(|e| e.session_id() != Some(session_id));
        }
        debug!(endpoint = endpoint.id(), session = ?endpoint.session_id(), "session registered");
        endpoints.push(endpoint);
    }

    /// Remove every endpoint matching the predicate; returns the removed
    /// entries so the caller can close or log them.
    pub async fn remove<F>(&self, predicate: F) -> Vec<Arc<Endpoint<S>>>
    where
        F: Fn(&Endpoint<S>) -> bool,
    {
        let mut endpoints = self.endpoints.write().await;
        let mut removed = Vec::new();
        endpoints.retain(|e| {
            if predicate(e) {
                removed.push(Arc::clone(e));
                false
            } else {
                true
            }
        });
        removed
    }

    /// Remove a single endpoint by its process-unique id.
    pub async fn remove_endpoint(&self, id: EndpointId) -> Option<Arc<Endpoint<S>>> {
        self.remove(|e| e.id() == id).await.into_iter().next()
    }

    /// Snapshot of the current membership, in insertion order.
    pub async fn list(&self) -> Vec<Arc<Endpoint<S>>> {
        self.endpoints.read().await.clone()
    }

    /// Look up a live endpoint by session id.
    pub async fn find_session(&self, session_id: Uuid) -> Option<Arc<Endpoint<S>>> {
        self.endpoints
            .read()
            .await
            .iter()
            .find(|e| e.session_id() == Some(session_id))
            .map(Arc::clone)
    }

    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.endpoints.read().await.is_empty()
    }
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionEvents;
    use lockline_crypto::SessionCredentials;
    use tokio::io::DuplexStream;

    fn endpoint_with_session(session_id: Uuid) -> Arc<Endpoint<DuplexStream>> {
        let (a, _b) = tokio::io::duplex(64);
        let mut endpoint = Endpoint::new(a, SessionEvents::new());
        endpoint.install_session(session_id, SessionCredentials::generate());
        endpoint.mark_open();
        Arc::new(endpoint)
    }

    #[tokio::test]
    async fn test_add_list_preserves_insertion_order() {
        let registry = SessionRegistry::new();
        let first = endpoint_with_session(Uuid::new_v4());
        let second = endpoint_with_session(Uuid::new_v4());

        registry.add(Arc::clone(&first)).await;
        registry.add(Arc::clone(&second)).await;

        let listed = registry.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id(), first.id());
        assert_eq!(listed[1].id(), second.id());
    }

    #[tokio::test]
    async fn test_duplicate_session_id_evicts_stale_entry() {
        let registry = SessionRegistry::new();
        let session_id = Uuid::new_v4();
        let stale = endpoint_with_session(session_id);
        let fresh = endpoint_with_session(session_id);

        registry.add(Arc::clone(&stale)).await;
        registry.add(Arc::clone(&fresh)).await;

        assert_eq!(registry.len().await, 1);
        let found = registry.find_session(session_id).await.unwrap();
        assert_eq!(found.id(), fresh.id());
    }

    #[tokio::test]
    async fn test_remove_by_predicate() {
        let registry = SessionRegistry::new();
        let keep = endpoint_with_session(Uuid::new_v4());
        let drop = endpoint_with_session(Uuid::new_v4());

        registry.add(Arc::clone(&keep)).await;
        registry.add(Arc::clone(&drop)).await;

        let removed = registry.remove(|e| e.id() == drop.id()).await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), drop.id());
        assert_eq!(registry.len().await, 1);
        assert!(registry.remove_endpoint(drop.id()).await.is_none());
    }
}
