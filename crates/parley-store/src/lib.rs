//! # parley-store
//!
//! Durable message storage for the parley chat service, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for message
//! records.  Messages are never hard-deleted here: deletion is a per-party
//! visibility flag, so one party hiding a message leaves the other party's
//! view intact.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::Message;
