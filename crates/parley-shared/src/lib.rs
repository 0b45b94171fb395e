//! # parley-shared
//!
//! Wire protocol types shared between the storage layer and the server.
//!
//! The realtime channel speaks flat JSON objects discriminated by a `type`
//! field.  This crate turns those duck-typed payloads into proper sum types
//! ([`protocol::ClientEvent`], [`protocol::ServerEvent`]) so the protocol
//! boundary is validated in exactly one place.

pub mod protocol;
pub mod types;

pub use protocol::{wire_now, ClientEvent, InboundFrame, ProtocolError, ServerEvent};
pub use types::UserId;
