//! Live connection handles.
//!
//! A [`ClientConnection`] is the server-side handle for one open WebSocket,
//! bound to exactly one user identity for its whole lifetime.  Pushing a
//! payload goes through a bounded channel into the socket's write task and
//! never blocks: a full or closed channel counts as a failed push, which
//! the dispatcher treats as a dead handle.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use parley_shared::{ServerEvent, UserId};

/// One live transport handle for a connected user.
pub struct ClientConnection {
    /// Unique connection identifier (one user may hold several).
    pub id: Uuid,
    /// The identity this connection is bound to.
    pub user_id: UserId,
    /// Send side of the bounded channel drained by the socket write task.
    tx: mpsc::Sender<Arc<String>>,
}

impl ClientConnection {
    /// Create a handle around the write-task channel.
    pub fn new(user_id: UserId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            tx,
        }
    }

    /// Push pre-serialized JSON to this connection.
    ///
    /// Returns `false` if the channel is full or closed.
    pub fn send(&self, payload: Arc<String>) -> bool {
        self.tx.try_send(payload).is_ok()
    }

    /// Serialize an event and push it to this connection.
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize event");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(buffer: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (ClientConnection::new(UserId(1), tx), rx)
    }

    #[tokio::test]
    async fn send_delivers_payload() {
        let (conn, mut rx) = make_connection(8);
        assert!(conn.send(Arc::new("hello".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_fails() {
        let (conn, rx) = make_connection(8);
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())));
    }

    #[tokio::test]
    async fn send_to_full_channel_fails() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.send(Arc::new("first".into())));
        assert!(!conn.send(Arc::new("second".into())));
    }

    #[tokio::test]
    async fn send_event_serializes_wire_shape() {
        let (conn, mut rx) = make_connection(8);
        assert!(conn.send_event(&ServerEvent::system("Connected to chat")));

        let json = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "system");
        assert_eq!(value["message"], "Connected to chat");
    }

    #[test]
    fn connection_ids_are_unique() {
        let (a, _rx_a) = make_connection(1);
        let (b, _rx_b) = make_connection(1);
        assert_ne!(a.id, b.id);
    }
}
