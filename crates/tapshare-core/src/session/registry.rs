//! Owned, lock-guarded map of live sessions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::TransferSession;

/// Registry of transfer sessions keyed by session id.
///
/// Cloning the registry yields another handle to the same map, which is how
/// the discovery responder and the manager share it.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<TransferSession>>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session, replacing any previous one with the same id.
    ///
    /// Returns the replaced session, if any.
    pub async fn insert(&self, session: Arc<TransferSession>) -> Option<Arc<TransferSession>> {
        let id = session.session_id().to_string();
        self.sessions.write().await.insert(id, session)
    }

    /// Look up a session.
    pub async fn get(&self, session_id: &str) -> Option<Arc<TransferSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Whether a session is registered.
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Remove a session. Removing an absent id is a no-op.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<TransferSession>> {
        self.sessions.write().await.remove(session_id)
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Identifiers of all registered sessions, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
