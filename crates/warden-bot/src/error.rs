use thiserror::Error;
use warden_shared::constants::GENERIC_APOLOGY;
use warden_shared::{ChatId, PlatformError};
use warden_store::StoreError;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User not authorized for chat {chat}")]
    Unauthorized { chat: ChatId },

    #[error("Transient platform failure: {0}")]
    PlatformTransient(PlatformError),

    #[error("Chat {old} migrated to {new}")]
    PlatformMigration { old: ChatId, new: ChatId },

    #[error("Corrupt record in {table}/{field}")]
    StoreCorruption { table: &'static str, field: String },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Platform error: {0}")]
    Platform(PlatformError),

    #[error("Malformed callback data: {0}")]
    BadCallback(String),
}

pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    /// Text safe to show in chat. Internal detail only goes to the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            BotError::Unauthorized { .. } => "Not authorized",
            BotError::NotFound(_) => "Sorry, I couldn't find that group.",
            _ => GENERIC_APOLOGY,
        }
    }

    /// Platform failure observed while operating on `chat`.
    pub fn platform(chat: ChatId, e: PlatformError) -> Self {
        match e {
            PlatformError::Migrated { new_chat } => BotError::PlatformMigration {
                old: chat,
                new: new_chat,
            },
            other => other.into(),
        }
    }

    /// Whether the failure is worth logging above `warn`.
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            BotError::NotFound(_)
                | BotError::Unauthorized { .. }
                | BotError::PlatformTransient(_)
                | BotError::PlatformMigration { .. }
        )
    }
}

impl From<PlatformError> for BotError {
    fn from(e: PlatformError) -> Self {
        if e.is_transient() {
            BotError::PlatformTransient(e)
        } else {
            BotError::Platform(e)
        }
    }
}

impl From<StoreError> for BotError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => BotError::NotFound("registry entry".into()),
            StoreError::Corrupt { table, field, .. } => BotError::StoreCorruption { table, field },
            StoreError::Platform(p) => p.into(),
            other => BotError::Store(other),
        }
    }
}
