//! CRUD operations for [`Message`] records.
//!
//! All operations are conversation-scoped by an unordered pair of user
//! identities unless noted.  Conversation history ordering is stable and
//! total (ascending creation time, ties broken by id), so edits never
//! visibly reorder history.

use chrono::{DateTime, Utc};
use rusqlite::params;

use parley_shared::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Persist a new message and return the stored record with its
    /// assigned identity and creation timestamp.
    ///
    /// Fails with [`StoreError::Validation`] before touching storage if the
    /// content is empty or either identity is invalid.
    pub fn create_message(
        &self,
        content: &str,
        sender: UserId,
        receiver: UserId,
    ) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(StoreError::Validation("content must not be empty".into()));
        }
        if !sender.is_valid() || !receiver.is_valid() {
            return Err(StoreError::Validation("invalid user id".into()));
        }
        if sender == receiver {
            return Err(StoreError::Validation(
                "sender and receiver must differ".into(),
            ));
        }

        let created_at = Utc::now();
        self.conn().execute(
            "INSERT INTO messages (content, sender, receiver, created_at, edited)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![content, sender.0, receiver.0, created_at.to_rfc3339()],
        )?;

        let id = self.conn().last_insert_rowid();
        tracing::debug!(id, sender = %sender, receiver = %receiver, "message stored");

        Ok(Message {
            id,
            content: content.to_string(),
            sender,
            receiver,
            created_at,
            edited: false,
            edited_at: None,
            deleted_for: None,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single message by id.
    pub fn get_message(&self, id: i64) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, content, sender, receiver, created_at, edited, edited_at, deleted_for
                 FROM messages WHERE id = ?1",
                params![id],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All messages between `requester` and `other`, ascending by
    /// `(created_at, id)`, excluding rows soft-deleted for the requester.
    ///
    /// The other party's deletions do not affect the requester's view.
    pub fn get_chat_messages(&self, requester: UserId, other: UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, content, sender, receiver, created_at, edited, edited_at, deleted_for
             FROM messages
             WHERE ((sender = ?1 AND receiver = ?2) OR (sender = ?2 AND receiver = ?1))
               AND (deleted_for IS NULL OR deleted_for != ?1)
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![requester.0, other.0], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite the content of an existing message.
    ///
    /// Only the original sender may edit.  On success the record's `edited`
    /// flag is set, `edited_at` is stamped with the current wall clock, and
    /// the updated record is returned.
    pub fn edit_message(&self, id: i64, new_content: &str, editor: UserId) -> Result<Message> {
        if new_content.trim().is_empty() {
            return Err(StoreError::Validation("content must not be empty".into()));
        }

        let mut message = self.get_message(id)?;
        if message.sender != editor {
            return Err(StoreError::Authorization);
        }

        let edited_at = Utc::now();
        self.conn().execute(
            "UPDATE messages SET content = ?1, edited = 1, edited_at = ?2 WHERE id = ?3",
            params![new_content, edited_at.to_rfc3339(), id],
        )?;

        tracing::debug!(id, editor = %editor, "message edited");

        message.content = new_content.to_string();
        message.edited = true;
        message.edited_at = Some(edited_at);
        Ok(message)
    }

    // ------------------------------------------------------------------
    // Delete (per-party visibility)
    // ------------------------------------------------------------------

    /// Hide a message from the requesting party's view.
    ///
    /// Either party of the conversation may delete for themselves; the
    /// record itself is kept so the other party's view is unaffected.
    pub fn delete_message(&self, id: i64, requester: UserId) -> Result<()> {
        let message = self.get_message(id)?;
        if message.sender != requester && message.receiver != requester {
            return Err(StoreError::Authorization);
        }

        self.conn().execute(
            "UPDATE messages SET deleted_for = ?1 WHERE id = ?2",
            params![requester.0, id],
        )?;

        tracing::debug!(id, requester = %requester, "message hidden for requester");
        Ok(())
    }

    /// Hide an entire conversation from the requesting party's view.
    ///
    /// Returns the number of newly hidden rows; rows already hidden for
    /// the requester are left untouched.
    pub fn delete_chat(&self, requester: UserId, other: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET deleted_for = ?1
             WHERE ((sender = ?1 AND receiver = ?2) OR (sender = ?2 AND receiver = ?1))
               AND deleted_for IS NULL",
            params![requester.0, other.0],
        )?;

        tracing::debug!(requester = %requester, other = %other, affected, "chat hidden for requester");
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let content: String = row.get(1)?;
    let sender: i64 = row.get(2)?;
    let receiver: i64 = row.get(3)?;
    let created_str: String = row.get(4)?;
    let edited: bool = row.get(5)?;
    let edited_str: Option<String> = row.get(6)?;
    let deleted_for: Option<i64> = row.get(7)?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let edited_at = edited_str
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        6,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })
        })
        .transpose()?;

    Ok(Message {
        id,
        content,
        sender: UserId(sender),
        receiver: UserId(receiver),
        created_at,
        edited,
        edited_at,
        deleted_for: deleted_for.map(UserId),
    })
}
