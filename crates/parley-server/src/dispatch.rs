//! Addressed event fan-out.
//!
//! The dispatcher resolves a target user through the connection registry
//! and pushes a payload to every live handle on that user's channel.
//! Delivery is best-effort and at-most-once per handle: a failed push is
//! logged and the dead handle is proactively unsubscribed, but it never
//! fails the call or blocks delivery to the remaining handles.  Durability
//! is the store's job, not the dispatcher's.

use std::sync::Arc;

use tracing::{debug, warn};

use parley_shared::{ServerEvent, UserId};

use crate::registry::ConnectionRegistry;

/// Routes outbound events to a user's live connections.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver an event to every live connection of `target`.
    ///
    /// No-ops without error when the target has no live connections;
    /// "recipient offline" is a normal outcome, and the durable record
    /// remains reachable through the fetch path.
    pub async fn deliver(&self, target: UserId, event: &ServerEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound event");
                return;
            }
        };

        let handles = self.registry.resolve(target).await;
        if handles.is_empty() {
            debug!(channel = %target.channel(), "no live connections, skipping delivery");
            return;
        }

        for conn in &handles {
            if !conn.send(Arc::clone(&json)) {
                warn!(
                    channel = %target.channel(),
                    conn_id = %conn.id,
                    "push failed, unsubscribing dead handle"
                );
                self.registry.unsubscribe(target, conn.id).await;
            }
        }

        debug!(
            channel = %target.channel(),
            recipients = handles.len(),
            "event delivered"
        );
    }
}
