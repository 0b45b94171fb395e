//! Realtime wire protocol.
//!
//! Inbound frames arrive as flat JSON with an optional `type` discriminator
//! (`"chat"` when absent).  They are decoded into a raw [`InboundFrame`]
//! first and then classified into the [`ClientEvent`] sum type, so malformed
//! events are rejected at the boundary before any storage or routing work.
//!
//! Outbound traffic is the [`ServerEvent`] enum, serialized flat with the
//! same `type` tag the clients expect.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::UserId;

/// Wire timestamps are wall-clock epoch milliseconds, assigned on the
/// handling side at the moment of processing (never client-supplied).
pub fn wire_now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Errors raised while classifying an inbound frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The `type` discriminator is not one of the recognized event kinds.
    #[error("Unknown event type: {0}")]
    UnknownType(String),

    /// An `edit` event arrived without the message identity it refers to.
    #[error("Edit event is missing messageId")]
    MissingMessageId,
}

/// A raw inbound event, exactly as decoded off the socket.
///
/// `type` absent is treated as `"chat"`.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "messageId")]
    pub message_id: Option<i64>,
    pub message: String,
    pub receiver: UserId,
}

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Send a new message to `receiver`.
    Send { content: String, receiver: UserId },
    /// Edit a previously sent message (content only).
    Edit {
        message_id: i64,
        content: String,
        receiver: UserId,
    },
}

impl InboundFrame {
    /// Classify the frame into a [`ClientEvent`], rejecting anything the
    /// protocol does not recognize.
    pub fn classify(self) -> Result<ClientEvent, ProtocolError> {
        match self.kind.as_deref() {
            None | Some("chat") => Ok(ClientEvent::Send {
                content: self.message,
                receiver: self.receiver,
            }),
            Some("edit") => {
                let message_id = self.message_id.ok_or(ProtocolError::MissingMessageId)?;
                Ok(ClientEvent::Edit {
                    message_id,
                    content: self.message,
                    receiver: self.receiver,
                })
            }
            Some(other) => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// An outbound event pushed over the realtime channel.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// A newly stored message, sent to the receiver and echoed to the
    /// sender as the persistence confirmation.
    Chat {
        sender: UserId,
        message: String,
        /// Store-assigned message identity.
        id: i64,
        timestamp: i64,
    },
    /// An applied edit (new content, same message identity).
    Edit {
        sender: UserId,
        message: String,
        #[serde(rename = "messageId")]
        message_id: i64,
        timestamp: i64,
    },
    /// Connect/disconnect/error notification for one connection.
    System { message: String, timestamp: i64 },
}

impl ServerEvent {
    /// Build a system notification stamped with the current wall clock.
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
            timestamp: wire_now(),
        }
    }
}
