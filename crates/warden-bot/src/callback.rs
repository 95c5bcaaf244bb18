//! Button payloads.
//!
//! Every inline button carries `<prefix>:<payload>`, decoded here into a
//! [`CallbackData`] and routed by one handler. Payloads stay well under the
//! platform's 64-byte limit.

use std::fmt;
use std::str::FromStr;

use warden_shared::{ChatId, PolicyFlag, Trigger};

use crate::error::BotError;

/// Change requested from the settings view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Re-render without changing anything.
    Refresh,
    Flag(PolicyFlag),
    Trigger(Trigger),
}

impl Mutation {
    const TABLE: [(Mutation, &'static str); 10] = [
        (Mutation::Refresh, "refresh"),
        (Mutation::Flag(PolicyFlag::BotEnabled), "bot"),
        (Mutation::Flag(PolicyFlag::Hidden), "hide"),
        (Mutation::Flag(PolicyFlag::DeleteJoinMessage), "deljoin"),
        (Mutation::Flag(PolicyFlag::DeleteLeaveMessage), "delleave"),
        (Mutation::Trigger(Trigger::JoinArabic), "join_ar"),
        (Mutation::Trigger(Trigger::JoinChinese), "join_zh"),
        (Mutation::Trigger(Trigger::MessageArabic), "msg_ar"),
        (Mutation::Trigger(Trigger::MessageChinese), "msg_zh"),
        (Mutation::Trigger(Trigger::BlacklistHit), "cas"),
    ];

    pub fn tag(&self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(m, _)| m == self)
            .map(|(_, tag)| *tag)
            .unwrap_or("refresh")
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::TABLE.iter().find(|(_, t)| *t == tag).map(|(m, _)| *m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryRef {
    Uncategorized,
    /// Position among the top-level categories, alphabetical.
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTarget {
    Groups,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackData {
    Settings { chat: ChatId, mutation: Mutation },
    /// A chat picked from the private settings list.
    Select(ChatId),
    Category(CategoryRef),
    Help(HelpTarget),
    /// Delete the message carrying the button.
    Close,
}

impl fmt::Display for CallbackData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackData::Settings { chat, mutation } => {
                write!(f, "set:{}:{}", mutation.tag(), chat)
            }
            CallbackData::Select(chat) => write!(f, "sel:{chat}"),
            CallbackData::Category(CategoryRef::Uncategorized) => f.write_str("cat:-"),
            CallbackData::Category(CategoryRef::Index(i)) => write!(f, "cat:{i}"),
            CallbackData::Help(HelpTarget::Groups) => f.write_str("help:groups"),
            CallbackData::Help(HelpTarget::Settings) => f.write_str("help:settings"),
            CallbackData::Close => f.write_str("close"),
        }
    }
}

impl FromStr for CallbackData {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || BotError::BadCallback(s.to_string());
        let (prefix, payload) = s.split_once(':').unwrap_or((s, ""));

        match prefix {
            "set" => {
                let (tag, chat) = payload.split_once(':').ok_or_else(bad)?;
                Ok(CallbackData::Settings {
                    mutation: Mutation::from_tag(tag).ok_or_else(bad)?,
                    chat: ChatId::from_field(chat).ok_or_else(bad)?,
                })
            }
            "sel" => Ok(CallbackData::Select(
                ChatId::from_field(payload).ok_or_else(bad)?,
            )),
            "cat" if payload == "-" => Ok(CallbackData::Category(CategoryRef::Uncategorized)),
            "cat" => payload
                .parse::<usize>()
                .map(|i| CallbackData::Category(CategoryRef::Index(i)))
                .map_err(|_| bad()),
            "help" => match payload {
                "groups" => Ok(CallbackData::Help(HelpTarget::Groups)),
                "settings" => Ok(CallbackData::Help(HelpTarget::Settings)),
                _ => Err(bad()),
            },
            "close" if payload.is_empty() => Ok(CallbackData::Close),
            _ => Err(bad()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mutation_survives_encoding() {
        for (mutation, _) in Mutation::TABLE {
            let data = CallbackData::Settings {
                chat: ChatId(-1001234567890),
                mutation,
            };
            let encoded = data.to_string();
            assert!(encoded.len() <= 64, "{encoded} too long");
            assert_eq!(encoded.parse::<CallbackData>().unwrap(), data);
        }
    }

    #[test]
    fn directory_payloads() {
        assert_eq!(
            "cat:-".parse::<CallbackData>().unwrap(),
            CallbackData::Category(CategoryRef::Uncategorized)
        );
        assert_eq!(
            "cat:3".parse::<CallbackData>().unwrap(),
            CallbackData::Category(CategoryRef::Index(3))
        );
        assert_eq!(CallbackData::Help(HelpTarget::Settings).to_string(), "help:settings");
    }

    #[test]
    fn garbage_is_rejected() {
        for junk in ["", "set", "set:bot", "set:nope:-1", "sel:abc", "cat:x", "help:", "close:1", "zzz:1"] {
            assert!(
                matches!(junk.parse::<CallbackData>(), Err(BotError::BadCallback(_))),
                "{junk:?} should not decode"
            );
        }
    }
}
