//! Core identity types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A numeric user identity, assigned by the external authentication
/// collaborator and trusted as-is for the lifetime of a connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// A user id is valid when it is strictly positive.
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }

    /// The logical broadcast channel name for this user (`user:<id>`).
    ///
    /// Channels are routing keys, not stored entities; this rendering is
    /// used for registry addressing and log output.
    pub fn channel(&self) -> String {
        format!("user:{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}
