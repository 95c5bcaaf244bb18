//! # warden-shared
//!
//! Domain types shared by every Warden crate: chat and user identities, the
//! moderation action model, the bot's administrator rights, the script
//! classifiers, and the interface of the chat-platform client.

pub mod classify;
pub mod constants;
pub mod platform;
pub mod policy;
pub mod rights;
pub mod types;

#[cfg(feature = "test-util")]
pub mod mock;

pub use platform::{
    InlineButton, Keyboard, OutgoingMessage, ParseMode, PlatformClient, PlatformError,
    PlatformResult,
};
pub use policy::{Action, ChatAdmins, PolicyFlag, PolicySettings, Trigger};
pub use rights::{AdminRights, ChatMember, MemberRole, Right, REQUIRED_RIGHTS};
pub use types::{ChatId, ChatKind, ChatRecord, MessageRef, User, UserId};
