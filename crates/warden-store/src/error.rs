use thiserror::Error;
use warden_shared::{ChatId, PlatformError};

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The addressed chat, field or deep link does not exist.
    #[error("Record not found")]
    NotFound,

    /// A stored value could not be deserialized.
    #[error("Corrupt entry {table}/{field}: {source}")]
    Corrupt {
        table: &'static str,
        field: String,
        #[source]
        source: serde_json::Error,
    },

    /// Serializing a value for storage failed.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Some of the per-table removals of a chat failed; the registry is
    /// left inconsistent for that chat.
    #[error("Partial delete of chat {chat}: could not clear {failed:?}")]
    PartialDelete {
        chat: ChatId,
        failed: Vec<&'static str>,
    },

    /// The platform failed while the registry resolved an invite link.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
