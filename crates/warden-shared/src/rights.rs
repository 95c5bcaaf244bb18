//! Administrator rights the bot needs in every managed chat.

use serde::{Deserialize, Serialize};

use crate::types::User;

/// A single platform administrator right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Right {
    ChangeInfo,
    DeleteMessages,
    InviteUsers,
    RestrictMembers,
    PinMessages,
    PromoteMembers,
}

/// Display data for a required right.
#[derive(Debug, Clone, Copy)]
pub struct RightSpec {
    pub right: Right,
    /// Platform field name, e.g. `can_delete_messages`.
    pub name: &'static str,
    /// One-letter tag used in compact audit lines.
    pub tag: &'static str,
    pub description: &'static str,
}

/// Rights checked by the privilege audit, in report order.
pub const REQUIRED_RIGHTS: &[RightSpec] = &[
    RightSpec {
        right: Right::ChangeInfo,
        name: "can_change_info",
        tag: "C",
        description: "Change group info",
    },
    RightSpec {
        right: Right::DeleteMessages,
        name: "can_delete_messages",
        tag: "D",
        description: "Delete messages",
    },
    RightSpec {
        right: Right::InviteUsers,
        name: "can_invite_users",
        tag: "I",
        description: "Invite users via link",
    },
    RightSpec {
        right: Right::RestrictMembers,
        name: "can_restrict_members",
        tag: "R",
        description: "Restrict/ban users",
    },
    RightSpec {
        right: Right::PinMessages,
        name: "can_pin_messages",
        tag: "N",
        description: "Pin messages",
    },
    RightSpec {
        right: Right::PromoteMembers,
        name: "can_promote_members",
        tag: "P",
        description: "Add new admins",
    },
];

impl Right {
    pub fn spec(&self) -> &'static RightSpec {
        REQUIRED_RIGHTS
            .iter()
            .find(|s| s.right == *self)
            .unwrap_or(&REQUIRED_RIGHTS[0])
    }

    pub fn tag(&self) -> &'static str {
        self.spec().tag
    }
}

/// The rights record the platform reports for an administrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRights {
    #[serde(default)]
    pub can_change_info: bool,
    #[serde(default)]
    pub can_delete_messages: bool,
    #[serde(default)]
    pub can_invite_users: bool,
    #[serde(default)]
    pub can_restrict_members: bool,
    #[serde(default)]
    pub can_pin_messages: bool,
    #[serde(default)]
    pub can_promote_members: bool,
}

impl AdminRights {
    pub const ALL: AdminRights = AdminRights {
        can_change_info: true,
        can_delete_messages: true,
        can_invite_users: true,
        can_restrict_members: true,
        can_pin_messages: true,
        can_promote_members: true,
    };

    pub fn has(&self, right: Right) -> bool {
        match right {
            Right::ChangeInfo => self.can_change_info,
            Right::DeleteMessages => self.can_delete_messages,
            Right::InviteUsers => self.can_invite_users,
            Right::RestrictMembers => self.can_restrict_members,
            Right::PinMessages => self.can_pin_messages,
            Right::PromoteMembers => self.can_promote_members,
        }
    }

    /// Required rights not granted, in [`REQUIRED_RIGHTS`] order.
    pub fn missing(&self) -> Vec<Right> {
        REQUIRED_RIGHTS
            .iter()
            .map(|s| s.right)
            .filter(|r| !self.has(*r))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

/// A user's membership in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMember {
    pub user: User,
    pub role: MemberRole,
    #[serde(default)]
    pub rights: AdminRights,
}

impl ChatMember {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, MemberRole::Creator | MemberRole::Administrator)
    }

    /// Rights the bot lacks. The creator implicitly holds every right.
    pub fn missing_rights(&self) -> Vec<Right> {
        match self.role {
            MemberRole::Creator => Vec::new(),
            _ => self.rights.missing(),
        }
    }
}
