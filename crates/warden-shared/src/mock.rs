//! In-memory [`PlatformClient`] that records every call.
//!
//! Only compiled with the `test-util` feature.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::platform::{OutgoingMessage, PlatformClient, PlatformError, PlatformResult};
use crate::rights::{AdminRights, ChatMember, MemberRole};
use crate::types::{ChatId, ChatRecord, MessageRef, User, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send { chat: ChatId, text: String },
    Edit { message: MessageRef, text: String },
    Delete(MessageRef),
    Answer { text: String, alert: bool },
    GetChat(ChatId),
    GetMember { chat: ChatId, user: UserId },
    GetAdmins(ChatId),
    ExportLink(ChatId),
    Kick { chat: ChatId, user: UserId },
    Ban { chat: ChatId, user: UserId },
    Leave(ChatId),
}

#[derive(Default)]
struct MockState {
    chats: HashMap<ChatId, ChatRecord>,
    members: HashMap<(ChatId, UserId), ChatMember>,
    admins: HashMap<ChatId, Vec<UserId>>,
    migrations: HashMap<ChatId, ChatId>,
    failing: HashSet<ChatId>,
    rate_limited_enforcements: usize,
    calls: Vec<Call>,
    member_lookups: Vec<Instant>,
    next_message_id: i64,
    links_issued: u64,
}

pub struct MockPlatform {
    me: User,
    state: Mutex<MockState>,
}

pub fn user(id: i64, first_name: &str) -> User {
    User {
        id: UserId(id),
        username: None,
        first_name: first_name.to_string(),
        last_name: None,
    }
}

impl MockPlatform {
    pub fn new(bot_id: i64) -> Self {
        Self {
            me: User {
                id: UserId(bot_id),
                username: Some("warden_bot".into()),
                first_name: "Warden".into(),
                last_name: None,
            },
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn bot_id(&self) -> UserId {
        self.me.id
    }

    pub fn add_chat(&self, record: ChatRecord) {
        self.state().chats.insert(record.id, record);
    }

    pub fn remove_chat(&self, chat: ChatId) {
        self.state().chats.remove(&chat);
    }

    /// Set the bot's own membership in `chat`.
    pub fn set_bot_role(&self, chat: ChatId, role: MemberRole, rights: AdminRights) {
        let member = ChatMember {
            user: self.me.clone(),
            role,
            rights,
        };
        self.state().members.insert((chat, self.me.id), member);
    }

    pub fn set_admins(&self, chat: ChatId, admins: &[i64]) {
        self.state()
            .admins
            .insert(chat, admins.iter().copied().map(UserId).collect());
    }

    /// Make `old` report a migration to `new_record`, which becomes a live chat.
    pub fn migrate(&self, old: ChatId, new_record: ChatRecord) {
        let mut state = self.state();
        state.migrations.insert(old, new_record.id);
        state.chats.insert(new_record.id, new_record);
    }

    /// Make every lookup on `chat` time out.
    pub fn fail_chat(&self, chat: ChatId) {
        self.state().failing.insert(chat);
    }

    /// Make the next `n` kick or ban calls fail with a rate limit.
    pub fn rate_limit_enforcements(&self, n: usize) {
        self.state().rate_limited_enforcements = n;
    }

    fn enforcement_result(&self) -> PlatformResult<()> {
        let mut state = self.state();
        if state.rate_limited_enforcements > 0 {
            state.rate_limited_enforcements -= 1;
            return Err(PlatformError::RateLimited { retry_after_secs: 3 });
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Instants at which `get_chat_member` was called.
    pub fn member_lookups(&self) -> Vec<Instant> {
        self.state().member_lookups.clone()
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }

    fn check_live(&self, chat: ChatId) -> PlatformResult<()> {
        let state = self.state();
        if state.failing.contains(&chat) {
            return Err(PlatformError::Timeout);
        }
        if let Some(new_chat) = state.migrations.get(&chat) {
            return Err(PlatformError::Migrated { new_chat: *new_chat });
        }
        if !state.chats.contains_key(&chat) {
            return Err(PlatformError::NotFound(format!("chat {chat}")));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn get_me(&self) -> PlatformResult<User> {
        Ok(self.me.clone())
    }

    async fn send_message(
        &self,
        chat: ChatId,
        message: OutgoingMessage,
    ) -> PlatformResult<MessageRef> {
        self.record(Call::Send {
            chat,
            text: message.text,
        });
        let mut state = self.state();
        state.next_message_id += 1;
        Ok(MessageRef {
            chat,
            id: state.next_message_id,
        })
    }

    async fn edit_message(&self, message: MessageRef, body: OutgoingMessage) -> PlatformResult<()> {
        self.record(Call::Edit {
            message,
            text: body.text,
        });
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> PlatformResult<()> {
        self.record(Call::Delete(message));
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str, text: &str, alert: bool) -> PlatformResult<()> {
        self.record(Call::Answer {
            text: text.to_string(),
            alert,
        });
        Ok(())
    }

    async fn get_chat(&self, chat: ChatId) -> PlatformResult<ChatRecord> {
        self.record(Call::GetChat(chat));
        self.check_live(chat)?;
        self.state()
            .chats
            .get(&chat)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("chat {chat}")))
    }

    async fn get_chat_member(&self, chat: ChatId, user: UserId) -> PlatformResult<ChatMember> {
        self.record(Call::GetMember { chat, user });
        self.state().member_lookups.push(Instant::now());
        self.check_live(chat)?;
        let state = self.state();
        if let Some(member) = state.members.get(&(chat, user)) {
            return Ok(member.clone());
        }
        let is_admin = state
            .admins
            .get(&chat)
            .is_some_and(|admins| admins.contains(&user));
        Ok(ChatMember {
            user: User {
                id: user,
                username: None,
                first_name: String::new(),
                last_name: None,
            },
            role: if is_admin {
                MemberRole::Administrator
            } else {
                MemberRole::Member
            },
            rights: AdminRights::default(),
        })
    }

    async fn get_chat_administrators(&self, chat: ChatId) -> PlatformResult<Vec<ChatMember>> {
        self.record(Call::GetAdmins(chat));
        self.check_live(chat)?;
        let state = self.state();
        let admins = state.admins.get(&chat).cloned().unwrap_or_default();
        Ok(admins
            .into_iter()
            .map(|id| ChatMember {
                user: User {
                    id,
                    username: None,
                    first_name: String::new(),
                    last_name: None,
                },
                role: MemberRole::Administrator,
                rights: AdminRights::default(),
            })
            .collect())
    }

    async fn export_invite_link(&self, chat: ChatId) -> PlatformResult<String> {
        self.record(Call::ExportLink(chat));
        self.check_live(chat)?;
        let mut state = self.state();
        state.links_issued += 1;
        Ok(format!("https://t.me/+{}-{}", chat.0.unsigned_abs(), state.links_issued))
    }

    async fn kick_member(&self, chat: ChatId, user: UserId) -> PlatformResult<()> {
        self.record(Call::Kick { chat, user });
        self.enforcement_result()
    }

    async fn ban_member(&self, chat: ChatId, user: UserId) -> PlatformResult<()> {
        self.record(Call::Ban { chat, user });
        self.enforcement_result()
    }

    async fn leave_chat(&self, chat: ChatId) -> PlatformResult<()> {
        self.record(Call::Leave(chat));
        Ok(())
    }
}
