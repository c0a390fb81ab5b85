//! Client registry: identity → live session.
//!
//! The single source of truth for who is connected. Every operation takes
//! the lock once, so each add, lookup and remove is atomic with
//! respect to other connections.

use crate::session::ClientSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Registry of identified client sessions, keyed by identity.
#[derive(Default)]
pub struct ClientRegistry {
    sessions: RwLock<HashMap<String, Arc<ClientSession>>>,
}

impl ClientRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session` unless its identity is already registered.
    ///
    /// On conflict the existing session is returned and nothing changes.
    pub async fn try_insert(&self, session: Arc<ClientSession>) -> Result<(), Arc<ClientSession>> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&session.identity) {
            return Err(existing.clone());
        }
        info!(identity = %session.identity, session_id = %session.id, "client registered");
        sessions.insert(session.identity.clone(), session);
        Ok(())
    }

    pub async fn get(&self, identity: &str) -> Option<Arc<ClientSession>> {
        self.sessions.read().await.get(identity).cloned()
    }

    pub async fn contains(&self, identity: &str) -> bool {
        self.sessions.read().await.contains_key(identity)
    }

    /// Remove `identity` only if its session was installed by `conn_id`.
    pub async fn remove_owned(&self, identity: &str, conn_id: u64) -> Option<Arc<ClientSession>> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(identity) {
            Some(session) if session.conn_id == conn_id => {
                debug!(identity, conn_id, "client unregistered");
                sessions.remove(identity)
            }
            _ => None,
        }
    }

    /// Remove and return every session.
    pub async fn drain(&self) -> Vec<Arc<ClientSession>> {
        let mut sessions = self.sessions.write().await;
        sessions.drain().map(|(_, s)| s).collect()
    }

    /// Number of registered clients.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
