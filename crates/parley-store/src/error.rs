use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A required field was missing or malformed; rejected before touching
    /// storage.
    #[error("Invalid message: {0}")]
    Validation(String),

    /// The acting identity lacks rights over the target record.  Kept
    /// deliberately generic so callers reveal nothing about the record.
    #[error("Not authorized")]
    Authorization,

    /// The referenced message identity does not exist.
    #[error("Message not found")]
    NotFound,

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
