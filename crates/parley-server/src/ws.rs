//! Realtime chat sessions.
//!
//! One task per connection runs the session state machine
//! (`Connecting -> Open -> Closed`): subscribe on open, classify and handle
//! inbound events strictly in order while open, unsubscribe and publish the
//! presence notification on close.  Persistence is awaited before fan-out,
//! so the sender's echo doubles as the durable-write confirmation; live
//! delivery to the receiver stays best-effort on top of that.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_shared::{wire_now, ClientEvent, InboundFrame, ServerEvent, UserId};
use parley_store::StoreError;

use crate::api::AppState;
use crate::connection::ClientConnection;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Validated user identity supplied by the authentication collaborator.
    #[serde(rename = "userId")]
    user_id: Option<UserId>,
}

/// `GET /ws/chat?userId=<n>` -- upgrade to a realtime chat session.
///
/// A connection without a valid identity is rejected before it ever
/// reaches the open state: no anonymous channels.
pub async fn chat_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(user_id) = query.user_id.filter(UserId::is_valid) else {
        warn!("rejecting websocket upgrade without a valid userId");
        return (StatusCode::BAD_REQUEST, "missing or invalid userId").into_response();
    };

    ws.on_upgrade(move |socket| chat_session(state, user_id, socket))
        .into_response()
}

/// Drive one connection from open to close.
async fn chat_session(state: AppState, user_id: UserId, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Arc<String>>(state.config.send_buffer);
    let conn = Arc::new(ClientConnection::new(user_id, tx));

    // Write task: drains the bounded channel into the socket.
    let writer = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if sink.send(WsMessage::Text((*json).clone())).await.is_err() {
                break;
            }
        }
    });

    state.registry.subscribe(Arc::clone(&conn)).await;
    info!(channel = %user_id.channel(), conn_id = %conn.id, "connection opened");

    conn.send_event(&ServerEvent::system("Connected to chat"));

    // Inbound events on one connection are handled strictly in order:
    // each one is awaited to completion before the next is read.
    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            WsMessage::Text(text) => handle_text(&state, &conn, &text).await,
            WsMessage::Close(_) => break,
            // Ping/pong are answered at the protocol layer; binary frames
            // are not part of the chat protocol.
            _ => {}
        }
    }

    handle_close(&state, &conn).await;

    drop(conn);
    let _ = writer.await;
}

/// Tear down a closed connection.
///
/// Presence is dropped first, then the notification goes to the user's
/// own channel (any remaining devices), not to counterparties.
async fn handle_close(state: &AppState, conn: &Arc<ClientConnection>) {
    state.registry.unsubscribe(conn.user_id, conn.id).await;
    state
        .dispatcher
        .deliver(conn.user_id, &ServerEvent::system("Disconnected from chat"))
        .await;
    info!(channel = %conn.user_id.channel(), conn_id = %conn.id, "connection closed");
}

/// Decode, classify, and handle one inbound frame.
///
/// All failures are reported to the originating connection only; the
/// receiver never sees another party's errors.
async fn handle_text(state: &AppState, conn: &Arc<ClientConnection>, text: &str) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(conn_id = %conn.id, error = %e, "undecodable frame");
            conn.send_event(&ServerEvent::system("Invalid message format"));
            return;
        }
    };

    let event = match frame.classify() {
        Ok(event) => event,
        Err(e) => {
            debug!(conn_id = %conn.id, error = %e, "unclassifiable frame");
            conn.send_event(&ServerEvent::system(e.to_string()));
            return;
        }
    };

    match event {
        ClientEvent::Send { content, receiver } => {
            handle_send(state, conn, content, receiver).await;
        }
        ClientEvent::Edit {
            message_id,
            content,
            ..
        } => {
            handle_edit(state, conn, message_id, content).await;
        }
    }
}

/// Persist a new message, fan it out to the receiver, echo to the sender.
async fn handle_send(
    state: &AppState,
    conn: &Arc<ClientConnection>,
    content: String,
    receiver: UserId,
) {
    let stored = {
        let db = state.db.lock().await;
        db.create_message(&content, conn.user_id, receiver)
    };

    let message = match stored {
        Ok(message) => message,
        Err(e) => {
            warn!(sender = %conn.user_id, error = %e, "failed to store message");
            conn.send_event(&ServerEvent::system(store_error_notice(&e)));
            return;
        }
    };

    let event = ServerEvent::Chat {
        sender: conn.user_id,
        message: message.content,
        id: message.id,
        timestamp: wire_now(),
    };

    state.dispatcher.deliver(receiver, &event).await;
    // Echo doubles as the persistence confirmation; the sender never
    // learns whether live delivery succeeded.
    conn.send_event(&event);
}

/// Apply an edit as the connection's own identity, then fan out and echo.
async fn handle_edit(
    state: &AppState,
    conn: &Arc<ClientConnection>,
    message_id: i64,
    content: String,
) {
    let edited = {
        let db = state.db.lock().await;
        db.edit_message(message_id, &content, conn.user_id)
    };

    let message = match edited {
        Ok(message) => message,
        Err(e) => {
            warn!(editor = %conn.user_id, message_id, error = %e, "failed to edit message");
            conn.send_event(&ServerEvent::system(store_error_notice(&e)));
            return;
        }
    };

    let event = ServerEvent::Edit {
        sender: conn.user_id,
        message: message.content,
        message_id: message.id,
        timestamp: wire_now(),
    };

    // The stored record is authoritative for who the counterpart is.
    state.dispatcher.deliver(message.receiver, &event).await;
    conn.send_event(&event);
}

/// What the originating connection is told when a store operation fails.
fn store_error_notice(err: &StoreError) -> String {
    match err {
        StoreError::Validation(_) => err.to_string(),
        StoreError::Authorization => "Not authorized".to_string(),
        StoreError::NotFound => "Message not found".to_string(),
        _ => "Error saving message".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::Mutex;

    use crate::config::ServerConfig;
    use crate::dispatch::Dispatcher;
    use crate::registry::ConnectionRegistry;
    use parley_store::Database;

    fn make_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let registry = Arc::new(ConnectionRegistry::new());
        let state = AppState {
            db: Arc::new(Mutex::new(db)),
            registry: Arc::clone(&registry),
            dispatcher: Arc::new(Dispatcher::new(registry)),
            config: Arc::new(ServerConfig::default()),
        };
        (dir, state)
    }

    fn make_connection(user: i64) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ClientConnection::new(UserId(user), tx)), rx)
    }

    async fn recv_json(rx: &mut mpsc::Receiver<Arc<String>>) -> serde_json::Value {
        let json = rx.recv().await.unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[tokio::test]
    async fn send_reaches_receiver_and_echoes_to_sender() {
        let (_dir, state) = make_state();
        let (sender, mut sender_rx) = make_connection(1);
        let (receiver, mut receiver_rx) = make_connection(2);
        state.registry.subscribe(Arc::clone(&receiver)).await;

        handle_text(&state, &sender, r#"{"message":"hi","receiver":2}"#).await;

        let delivered = recv_json(&mut receiver_rx).await;
        assert_eq!(delivered["type"], "chat");
        assert_eq!(delivered["sender"], 1);
        assert_eq!(delivered["message"], "hi");
        assert!(delivered["id"].is_i64());

        // The sender's echo is the same payload.
        let echoed = recv_json(&mut sender_rx).await;
        assert_eq!(echoed, delivered);

        // And the message was durably stored.
        let history = state
            .db
            .lock()
            .await
            .get_chat_messages(UserId(2), UserId(1))
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hi");
    }

    #[tokio::test]
    async fn send_to_offline_receiver_still_confirms() {
        let (_dir, state) = make_state();
        let (sender, mut sender_rx) = make_connection(1);

        handle_text(&state, &sender, r#"{"message":"hi","receiver":2}"#).await;

        // No receiver connected, but the sender still gets the
        // persistence confirmation.
        let echoed = recv_json(&mut sender_rx).await;
        assert_eq!(echoed["type"], "chat");
        assert_eq!(echoed["message"], "hi");
    }

    #[tokio::test]
    async fn multi_device_receiver_gets_payload_on_each_device() {
        let (_dir, state) = make_state();
        let (sender, _sender_rx) = make_connection(1);
        let (phone, mut phone_rx) = make_connection(2);
        let (laptop, mut laptop_rx) = make_connection(2);
        state.registry.subscribe(phone).await;
        state.registry.subscribe(laptop).await;

        handle_text(&state, &sender, r#"{"message":"hi","receiver":2}"#).await;

        for rx in [&mut phone_rx, &mut laptop_rx] {
            let delivered = recv_json(rx).await;
            assert_eq!(delivered["type"], "chat");
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn invalid_json_reports_to_sender_only() {
        let (_dir, state) = make_state();
        let (sender, mut sender_rx) = make_connection(1);
        let (receiver, mut receiver_rx) = make_connection(2);
        state.registry.subscribe(receiver).await;

        handle_text(&state, &sender, "not json").await;

        let notice = recv_json(&mut sender_rx).await;
        assert_eq!(notice["type"], "system");
        assert_eq!(notice["message"], "Invalid message format");
        assert!(receiver_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_content_is_rejected_before_storage() {
        let (_dir, state) = make_state();
        let (sender, mut sender_rx) = make_connection(1);

        handle_text(&state, &sender, r#"{"message":"  ","receiver":2}"#).await;

        let notice = recv_json(&mut sender_rx).await;
        assert_eq!(notice["type"], "system");
        assert!(notice["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid message"));

        let history = state
            .db
            .lock()
            .await
            .get_chat_messages(UserId(1), UserId(2))
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn unknown_event_type_reports_to_sender() {
        let (_dir, state) = make_state();
        let (sender, mut sender_rx) = make_connection(1);

        handle_text(&state, &sender, r#"{"type":"typing","message":"","receiver":2}"#).await;

        let notice = recv_json(&mut sender_rx).await;
        assert_eq!(notice["type"], "system");
        assert_eq!(notice["message"], "Unknown event type: typing");
    }

    #[tokio::test]
    async fn edit_fans_out_to_receiver_and_echoes() {
        let (_dir, state) = make_state();
        let (sender, mut sender_rx) = make_connection(1);
        let (receiver, mut receiver_rx) = make_connection(2);
        state.registry.subscribe(receiver).await;

        let stored = state
            .db
            .lock()
            .await
            .create_message("hi", UserId(1), UserId(2))
            .unwrap();

        let frame = format!(
            r#"{{"type":"edit","messageId":{},"message":"hi there","receiver":2}}"#,
            stored.id
        );
        handle_text(&state, &sender, &frame).await;

        let delivered = recv_json(&mut receiver_rx).await;
        assert_eq!(delivered["type"], "edit");
        assert_eq!(delivered["messageId"], stored.id);
        assert_eq!(delivered["message"], "hi there");

        let echoed = recv_json(&mut sender_rx).await;
        assert_eq!(echoed, delivered);

        let fetched = state.db.lock().await.get_message(stored.id).unwrap();
        assert!(fetched.edited);
        assert_eq!(fetched.content, "hi there");
    }

    #[tokio::test]
    async fn edit_by_non_sender_fails_to_editor_only() {
        let (_dir, state) = make_state();
        let (intruder, mut intruder_rx) = make_connection(3);
        let (receiver, mut receiver_rx) = make_connection(2);
        state.registry.subscribe(receiver).await;

        let stored = state
            .db
            .lock()
            .await
            .create_message("hi", UserId(1), UserId(2))
            .unwrap();

        let frame = format!(
            r#"{{"type":"edit","messageId":{},"message":"hacked","receiver":2}}"#,
            stored.id
        );
        handle_text(&state, &intruder, &frame).await;

        let notice = recv_json(&mut intruder_rx).await;
        assert_eq!(notice["type"], "system");
        assert_eq!(notice["message"], "Not authorized");
        assert!(receiver_rx.try_recv().is_err());

        let fetched = state.db.lock().await.get_message(stored.id).unwrap();
        assert_eq!(fetched.content, "hi");
    }

    #[tokio::test]
    async fn edit_of_missing_message_reports_not_found() {
        let (_dir, state) = make_state();
        let (sender, mut sender_rx) = make_connection(1);

        handle_text(
            &state,
            &sender,
            r#"{"type":"edit","messageId":999,"message":"x","receiver":2}"#,
        )
        .await;

        let notice = recv_json(&mut sender_rx).await;
        assert_eq!(notice["type"], "system");
        assert_eq!(notice["message"], "Message not found");
    }

    #[tokio::test]
    async fn close_notifies_remaining_devices_only() {
        let (_dir, state) = make_state();
        let (closing, mut closing_rx) = make_connection(1);
        let (remaining, mut remaining_rx) = make_connection(1);
        let (counterparty, mut counterparty_rx) = make_connection(2);
        state.registry.subscribe(Arc::clone(&closing)).await;
        state.registry.subscribe(Arc::clone(&remaining)).await;
        state.registry.subscribe(counterparty).await;

        handle_close(&state, &closing).await;

        // The closed handle is gone from presence.
        let handles = state.registry.resolve(UserId(1)).await;
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].id, remaining.id);

        // The presence event lands on the user's own remaining device.
        let notice = recv_json(&mut remaining_rx).await;
        assert_eq!(notice["type"], "system");
        assert_eq!(notice["message"], "Disconnected from chat");
        assert!(remaining_rx.try_recv().is_err());

        // Never on the closed handle itself, never on a counterparty.
        assert!(closing_rx.try_recv().is_err());
        assert!(counterparty_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_of_last_device_is_silent() {
        let (_dir, state) = make_state();
        let (only, mut only_rx) = make_connection(1);
        state.registry.subscribe(Arc::clone(&only)).await;

        handle_close(&state, &only).await;

        assert!(state.registry.resolve(UserId(1)).await.is_empty());
        assert!(only_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_then_edit_timestamps_are_non_decreasing() {
        let (_dir, state) = make_state();
        let (sender, mut sender_rx) = make_connection(1);

        handle_text(&state, &sender, r#"{"message":"hi","receiver":2}"#).await;
        let sent = recv_json(&mut sender_rx).await;
        let id = sent["id"].as_i64().unwrap();

        let frame =
            format!(r#"{{"type":"edit","messageId":{id},"message":"hi there","receiver":2}}"#);
        handle_text(&state, &sender, &frame).await;
        let edited = recv_json(&mut sender_rx).await;

        assert!(edited["timestamp"].as_i64().unwrap() >= sent["timestamp"].as_i64().unwrap());
    }
}
