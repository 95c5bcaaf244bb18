//! Inbound events, as handed to the bot by the platform adapter.

use warden_shared::{ChatId, ChatRecord, MessageRef, User};

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub message: MessageRef,
    pub chat: ChatRecord,
    pub sender: User,
    pub text: String,
}

impl IncomingMessage {
    pub fn is_private(&self) -> bool {
        !self.chat.kind.is_group()
    }

    pub fn is_command(&self) -> bool {
        self.text.starts_with('/')
    }
}

#[derive(Debug, Clone)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// The message carrying the pressed button.
    pub message: MessageRef,
    pub data: String,
}

#[derive(Debug, Clone)]
pub enum Update {
    Message(IncomingMessage),
    Callback(CallbackQuery),
    MemberJoined {
        chat: ChatRecord,
        user: User,
        notice: Option<MessageRef>,
    },
    MemberLeft {
        chat: ChatRecord,
        user: User,
        notice: Option<MessageRef>,
    },
    BotAdded {
        chat: ChatRecord,
    },
    BotRemoved {
        chat: ChatId,
    },
}

impl Update {
    pub fn kind(&self) -> &'static str {
        match self {
            Update::Message(_) => "message",
            Update::Callback(_) => "callback",
            Update::MemberJoined { .. } => "member_joined",
            Update::MemberLeft { .. } => "member_left",
            Update::BotAdded { .. } => "bot_added",
            Update::BotRemoved { .. } => "bot_removed",
        }
    }
}
