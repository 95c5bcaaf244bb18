use serde::{Deserialize, Serialize};

/// Platform-assigned chat identity.
///
/// Not stable across a group-to-supergroup migration: the platform hands out
/// a new id and the old one stops working.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl ChatId {
    /// Key used for this chat in every store table.
    pub fn to_field(&self) -> String {
        self.0.to_string()
    }

    pub fn from_field(s: &str) -> Option<Self> {
        s.trim().parse::<i64>().ok().map(Self)
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message inside a chat, as needed to edit or delete it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat: ChatId,
    pub id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_group(&self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    /// Name fields the join classifiers look at.
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// Stable metadata of a chat the bot is a member of.
///
/// The invite link is a cache: the platform can revoke it server-side, so it
/// is dropped on migration and refetched on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRecord {
    pub id: ChatId,
    pub kind: ChatKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub invite_link: Option<String>,
    /// Mirror of the `hidden` policy flag so directory listings need no
    /// per-chat settings reads.
    #[serde(default)]
    pub hidden: bool,
}

impl ChatRecord {
    pub fn new(id: ChatId, kind: ChatKind, title: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            title: title.into(),
            username: None,
            first_name: None,
            last_name: None,
            invite_link: None,
            hidden: false,
        }
    }

    /// Take fresh metadata from `live` while keeping what only we know:
    /// the cached invite link and the hidden mirror.
    pub fn refreshed_from(&self, live: &ChatRecord) -> ChatRecord {
        ChatRecord {
            invite_link: live.invite_link.clone().or_else(|| self.invite_link.clone()),
            hidden: self.hidden,
            ..live.clone()
        }
    }
}
