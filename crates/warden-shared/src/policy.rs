//! The moderation action model and the per-chat policy record.
//!
//! Policy is a fixed table: each [`Trigger`] holds exactly one [`Action`].
//! There is no combination logic across triggers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Enforcement applied when a trigger fires.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    None,
    /// Remove the member but allow them to rejoin.
    Kick,
    /// Remove the member and block rejoining.
    Ban,
}

impl Action {
    pub fn is_none(&self) -> bool {
        matches!(self, Action::None)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::None => "Do nothing",
            Action::Kick => "Kick",
            Action::Ban => "Ban",
        }
    }
}

/// The fixed set of classification events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    JoinArabic,
    JoinChinese,
    MessageArabic,
    MessageChinese,
    BlacklistHit,
}

impl Trigger {
    pub const ALL: [Trigger; 5] = [
        Trigger::JoinArabic,
        Trigger::JoinChinese,
        Trigger::MessageArabic,
        Trigger::MessageChinese,
        Trigger::BlacklistHit,
    ];

    /// Evaluation order on join. The first trigger with a non-`None` action
    /// that matches wins.
    pub const ON_JOIN: [Trigger; 3] =
        [Trigger::JoinArabic, Trigger::JoinChinese, Trigger::BlacklistHit];

    /// Evaluation order on message, same first-match rule.
    pub const ON_MESSAGE: [Trigger; 3] = [
        Trigger::MessageArabic,
        Trigger::MessageChinese,
        Trigger::BlacklistHit,
    ];

    /// The non-`None` action a toggle switches this trigger to.
    pub fn designated_action(&self) -> Action {
        match self {
            Trigger::JoinArabic | Trigger::JoinChinese => Action::Ban,
            Trigger::MessageArabic | Trigger::MessageChinese | Trigger::BlacklistHit => {
                Action::Kick
            }
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trigger::JoinArabic => "join-arabic",
            Trigger::JoinChinese => "join-chinese",
            Trigger::MessageArabic => "message-arabic",
            Trigger::MessageChinese => "message-chinese",
            Trigger::BlacklistHit => "blacklist-hit",
        };
        f.write_str(s)
    }
}

/// Boolean switches of a chat policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PolicyFlag {
    BotEnabled,
    Hidden,
    DeleteJoinMessage,
    DeleteLeaveMessage,
}

/// Platform user ids allowed to edit a chat's policy.
///
/// Always copied from the platform's administrator list, never edited
/// locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ChatAdmins(BTreeSet<UserId>);

impl ChatAdmins {
    pub fn is_admin(&self, user: UserId) -> bool {
        self.0.contains(&user)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<UserId> for ChatAdmins {
    fn from_iter<I: IntoIterator<Item = UserId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Per-chat moderation policy. Defaults are all `false` / [`Action::None`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicySettings {
    #[serde(default)]
    pub bot_enabled: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub delete_join_message: bool,
    #[serde(default)]
    pub delete_leave_message: bool,

    #[serde(default)]
    pub on_join_arabic: Action,
    #[serde(default)]
    pub on_join_chinese: Action,
    #[serde(default)]
    pub on_message_arabic: Action,
    #[serde(default)]
    pub on_message_chinese: Action,
    #[serde(default)]
    pub on_blacklist_hit: Action,

    #[serde(default)]
    pub chat_admins: ChatAdmins,
}

impl PolicySettings {
    pub fn action(&self, trigger: Trigger) -> Action {
        match trigger {
            Trigger::JoinArabic => self.on_join_arabic,
            Trigger::JoinChinese => self.on_join_chinese,
            Trigger::MessageArabic => self.on_message_arabic,
            Trigger::MessageChinese => self.on_message_chinese,
            Trigger::BlacklistHit => self.on_blacklist_hit,
        }
    }

    pub fn set_action(&mut self, trigger: Trigger, action: Action) {
        let slot = match trigger {
            Trigger::JoinArabic => &mut self.on_join_arabic,
            Trigger::JoinChinese => &mut self.on_join_chinese,
            Trigger::MessageArabic => &mut self.on_message_arabic,
            Trigger::MessageChinese => &mut self.on_message_chinese,
            Trigger::BlacklistHit => &mut self.on_blacklist_hit,
        };
        *slot = action;
    }

    pub fn flag(&self, flag: PolicyFlag) -> bool {
        match flag {
            PolicyFlag::BotEnabled => self.bot_enabled,
            PolicyFlag::Hidden => self.hidden,
            PolicyFlag::DeleteJoinMessage => self.delete_join_message,
            PolicyFlag::DeleteLeaveMessage => self.delete_leave_message,
        }
    }

    /// Flip one boolean switch.
    pub fn toggled_flag(mut self, flag: PolicyFlag) -> Self {
        let slot = match flag {
            PolicyFlag::BotEnabled => &mut self.bot_enabled,
            PolicyFlag::Hidden => &mut self.hidden,
            PolicyFlag::DeleteJoinMessage => &mut self.delete_join_message,
            PolicyFlag::DeleteLeaveMessage => &mut self.delete_leave_message,
        };
        *slot = !*slot;
        self
    }

    /// Swap a trigger between `None` and its designated action.
    pub fn toggled_trigger(mut self, trigger: Trigger) -> Self {
        let next = if self.action(trigger).is_none() {
            trigger.designated_action()
        } else {
            Action::None
        };
        self.set_action(trigger, next);
        self
    }

    /// Whether any trigger can lead to a kick or ban.
    pub fn enforces_anything(&self) -> bool {
        Trigger::ALL.iter().any(|t| !self.action(*t).is_none())
    }
}
