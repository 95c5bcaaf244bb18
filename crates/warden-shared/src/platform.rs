//! Interface of the chat-platform client.
//!
//! Delivery, rate limiting and retries live behind this trait; Warden only
//! surfaces the failures it reports.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rights::ChatMember;
use crate::types::{ChatId, ChatRecord, MessageRef, User, UserId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The basic group was upgraded and now lives under `new_chat`.
    #[error("Chat migrated to {new_chat}")]
    Migrated { new_chat: ChatId },

    #[error("Chat or user not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out")]
    Timeout,

    #[error("Platform API error: {0}")]
    Api(String),
}

impl PlatformError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::RateLimited { .. } | PlatformError::Timeout)
    }

    /// The bot can no longer see or act in the chat.
    pub fn is_gone(&self) -> bool {
        matches!(self, PlatformError::NotFound(_) | PlatformError::Forbidden(_))
    }
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    /// Opaque callback data, at most 64 bytes on the wire.
    pub data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

/// Rows of inline buttons attached to a message.
pub type Keyboard = Vec<Vec<InlineButton>>;

/// Formatting applied by the platform to outgoing text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    #[default]
    Plain,
    Html,
    Markdown,
}

/// An outgoing message body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub parse_mode: ParseMode,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = mode;
        self
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Operations Warden needs from the chat platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// The bot's own account.
    async fn get_me(&self) -> PlatformResult<User>;

    async fn send_message(&self, chat: ChatId, message: OutgoingMessage)
        -> PlatformResult<MessageRef>;

    async fn edit_message(&self, message: MessageRef, body: OutgoingMessage) -> PlatformResult<()>;

    async fn delete_message(&self, message: MessageRef) -> PlatformResult<()>;

    /// Acknowledge a button press, optionally as a modal alert.
    async fn answer_callback(&self, callback_id: &str, text: &str, alert: bool)
        -> PlatformResult<()>;

    /// Live chat metadata. Extra platform fields are already dropped.
    async fn get_chat(&self, chat: ChatId) -> PlatformResult<ChatRecord>;

    async fn get_chat_member(&self, chat: ChatId, user: UserId) -> PlatformResult<ChatMember>;

    async fn get_chat_administrators(&self, chat: ChatId) -> PlatformResult<Vec<ChatMember>>;

    /// Generate a fresh primary invite link. Fails with
    /// [`PlatformError::Migrated`] when the chat was upgraded.
    async fn export_invite_link(&self, chat: ChatId) -> PlatformResult<String>;

    /// Remove a member, allowing them to rejoin.
    async fn kick_member(&self, chat: ChatId, user: UserId) -> PlatformResult<()>;

    /// Remove a member and block them from rejoining.
    async fn ban_member(&self, chat: ChatId, user: UserId) -> PlatformResult<()>;

    async fn leave_chat(&self, chat: ChatId) -> PlatformResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_gone_are_disjoint() {
        let transient = [PlatformError::Timeout, PlatformError::RateLimited { retry_after_secs: 3 }];
        for e in transient {
            assert!(e.is_transient());
            assert!(!e.is_gone());
        }
        assert!(PlatformError::Forbidden("kicked".into()).is_gone());
        assert!(!PlatformError::Migrated { new_chat: ChatId(-100) }.is_transient());
    }
}
