//! Connection registry: live presence state.
//!
//! Maps each user identity (the `user:<id>` channel) to the set of live
//! connection handles subscribed to it.  The mapping is process-local and
//! in-memory only: presence reflects transport liveness, not a durable
//! fact, so a restart intentionally clears it and the map is rebuilt as
//! connections open.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use parley_shared::UserId;

use crate::connection::ClientConnection;

/// Tracks live addressable connections keyed by user identity.
#[derive(Default)]
pub struct ConnectionRegistry {
    channels: RwLock<HashMap<UserId, Vec<Arc<ClientConnection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle under its user's channel.
    ///
    /// Idempotent per handle; a user may hold any number of simultaneous
    /// connections (multi-device) and all of them are retained.
    pub async fn subscribe(&self, conn: Arc<ClientConnection>) {
        let mut channels = self.channels.write().await;
        let handles = channels.entry(conn.user_id).or_default();
        if handles.iter().all(|existing| existing.id != conn.id) {
            handles.push(conn);
        }
    }

    /// Remove a handle from its user's channel; no-op if already absent.
    pub async fn unsubscribe(&self, user_id: UserId, conn_id: Uuid) {
        let mut channels = self.channels.write().await;
        if let Some(handles) = channels.get_mut(&user_id) {
            handles.retain(|conn| conn.id != conn_id);
            if handles.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// All live handles for a user.  Empty means "offline", which is a
    /// normal outcome, never an error.
    pub async fn resolve(&self, user_id: UserId) -> Vec<Arc<ClientConnection>> {
        let channels = self.channels.read().await;
        channels.get(&user_id).cloned().unwrap_or_default()
    }

    /// Total number of live connections across all channels.
    pub async fn connection_count(&self) -> usize {
        let channels = self.channels.read().await;
        channels.values().map(Vec::len).sum()
    }
}
