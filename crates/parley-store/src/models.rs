//! Domain model structs persisted in the message database.
//!
//! [`Message`] derives `Serialize` so it can be handed directly to the REST
//! layer as a response payload.

use chrono::{DateTime, Utc};
use serde::Serialize;

use parley_shared::UserId;

/// A single chat message between two users.
///
/// The identity is assigned by the store on insert and is immutable, as is
/// the sender/receiver pairing.  Content changes only through an explicit
/// edit, which also sets `edited` and `edited_at`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Store-assigned unique identifier (SQLite rowid).
    pub id: i64,
    /// Message text.
    pub content: String,
    /// The user who sent the message.
    pub sender: UserId,
    /// The user the message is addressed to.
    pub receiver: UserId,
    /// When the message was persisted (handling-side wall clock).
    pub created_at: DateTime<Utc>,
    /// Whether the content has been overwritten by an edit.
    pub edited: bool,
    /// When the last edit was applied, if any.
    pub edited_at: Option<DateTime<Utc>>,
    /// If set, the message is hidden from this party's view only.
    pub deleted_for: Option<UserId>,
}
