//! HTTP surface: REST message endpoints plus the realtime upgrade route.
//!
//! The REST endpoints are the non-realtime retrieval/mutation path.  They
//! go through the same store as the realtime channel and therefore observe
//! the same per-party visibility rules.

use std::sync::Arc;

use axum::{
    extract::State,
    http::Method,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_shared::UserId;
use parley_store::{Database, Message};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::registry::ConnectionRegistry;
use crate::ws;

/// The message database behind an async mutex: all conflicting writes to a
/// record are serialized, so concurrent edits degenerate to
/// last-writer-wins without partial writes.
pub type SharedDb = Arc<Mutex<Database>>;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/messages/chat", post(message_create))
        .route("/messages/fetch", post(messages_fetch))
        .route("/messages/delete", post(message_delete))
        .route("/messages/edit", put(message_edit))
        .route("/chats/delete", post(chat_delete))
        .route("/ws/chat", get(ws::chat_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationRequest {
    user_id: UserId,
    other_user_id: UserId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMessageRequest {
    user_id: UserId,
    other_user_id: UserId,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteMessageRequest {
    message_id: i64,
    user_id: UserId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditMessageRequest {
    message_id: i64,
    content: String,
    user_id: UserId,
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    data: Message,
}

#[derive(Serialize)]
struct MessagesResponse {
    success: bool,
    data: Vec<Message>,
}

#[derive(Serialize)]
struct AckResponse {
    success: bool,
}

#[derive(Serialize)]
struct ChatDeleteResponse {
    success: bool,
    deleted: usize,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn message_create(
    State(state): State<AppState>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<Json<MessageResponse>, ServerError> {
    let message = state
        .db
        .lock()
        .await
        .create_message(&req.message, req.user_id, req.other_user_id)?;

    info!(id = message.id, sender = %req.user_id, "message created via REST");
    Ok(Json(MessageResponse {
        success: true,
        data: message,
    }))
}

async fn messages_fetch(
    State(state): State<AppState>,
    Json(req): Json<ConversationRequest>,
) -> Result<Json<MessagesResponse>, ServerError> {
    let messages = state
        .db
        .lock()
        .await
        .get_chat_messages(req.user_id, req.other_user_id)?;

    Ok(Json(MessagesResponse {
        success: true,
        data: messages,
    }))
}

async fn message_delete(
    State(state): State<AppState>,
    Json(req): Json<DeleteMessageRequest>,
) -> Result<Json<AckResponse>, ServerError> {
    state
        .db
        .lock()
        .await
        .delete_message(req.message_id, req.user_id)?;

    info!(id = req.message_id, requester = %req.user_id, "message deleted via REST");
    Ok(Json(AckResponse { success: true }))
}

async fn message_edit(
    State(state): State<AppState>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<AckResponse>, ServerError> {
    state
        .db
        .lock()
        .await
        .edit_message(req.message_id, &req.content, req.user_id)?;

    info!(id = req.message_id, editor = %req.user_id, "message edited via REST");
    Ok(Json(AckResponse { success: true }))
}

async fn chat_delete(
    State(state): State<AppState>,
    Json(req): Json<ConversationRequest>,
) -> Result<Json<ChatDeleteResponse>, ServerError> {
    let deleted = state
        .db
        .lock()
        .await
        .delete_chat(req.user_id, req.other_user_id)?;

    info!(requester = %req.user_id, deleted, "chat deleted via REST");
    Ok(Json(ChatDeleteResponse {
        success: true,
        deleted,
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
