//! The context shared by every update handler.
//!
//! Built once at startup and handed to each task behind an `Arc`. Nothing in
//! here is mutated per chat; chat state lives in the registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};
use warden_shared::{
    ChatAdmins, ChatId, ChatRecord, PlatformClient, PolicySettings, User, UserId,
};
use warden_store::{CategoryAssignments, Registry};

use crate::blacklist::Blacklist;
use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::guard::EnforcementGuard;

/// Process-wide counters.
#[derive(Debug, Default)]
pub struct Metrics {
    pub updates: AtomicU64,
    pub commands: AtomicU64,
    pub enforcements: AtomicU64,
    pub enforcement_failures: AtomicU64,
    pub suppressed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub updates: u64,
    pub commands: u64,
    pub enforcements: u64,
    pub enforcement_failures: u64,
    pub suppressed: u64,
}

impl Metrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            updates: self.updates.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            enforcements: self.enforcements.load(Ordering::Relaxed),
            enforcement_failures: self.enforcement_failures.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
        }
    }
}

pub struct BotContext {
    pub platform: Arc<dyn PlatformClient>,
    pub registry: Registry,
    pub config: Arc<BotConfig>,
    pub assignments: Arc<CategoryAssignments>,
    pub blacklist: Arc<dyn Blacklist>,
    pub guard: EnforcementGuard,
    pub metrics: Metrics,
    /// The bot's own account.
    pub me: User,
}

impl BotContext {
    /// Ask the platform who we are and assemble the context.
    pub async fn new(
        platform: Arc<dyn PlatformClient>,
        registry: Registry,
        config: BotConfig,
        assignments: CategoryAssignments,
        blacklist: Arc<dyn Blacklist>,
    ) -> Result<Self> {
        let me = platform.get_me().await?;
        info!(bot = %me.id, username = ?me.username, "bot identity resolved");
        let guard = EnforcementGuard::new(config.dedup_window);
        Ok(Self {
            platform,
            registry,
            config: Arc::new(config),
            assignments: Arc::new(assignments),
            blacklist,
            guard,
            metrics: Metrics::default(),
            me,
        })
    }

    pub fn is_global_admin(&self, user: UserId) -> bool {
        self.config.is_global_admin(user)
    }

    /// Policy of `chat`, registering the chat on first contact.
    pub async fn settings_for(&self, chat: &ChatRecord) -> Result<PolicySettings> {
        if let Some(settings) = self.registry.settings(chat.id).await? {
            return Ok(settings);
        }
        self.register_chat(chat).await
    }

    /// Make sure `chat` has a record and a policy. Existing entries are kept;
    /// a new policy starts from the inert defaults with the platform's
    /// current administrator list.
    pub async fn register_chat(&self, chat: &ChatRecord) -> Result<PolicySettings> {
        if self.registry.get(chat.id).await?.is_none() {
            self.registry.upsert(chat).await?;
            info!(chat = %chat.id, title = %chat.title, "chat registered");
        }

        if let Some(settings) = self.registry.settings(chat.id).await? {
            return Ok(settings);
        }

        self.registry
            .save_settings(chat.id, &PolicySettings::default())
            .await?;
        match self.refresh_admins(chat.id).await {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!(chat = %chat.id, error = %e, "could not load admin list for new chat");
                Ok(PolicySettings::default())
            }
        }
    }

    /// Replace the stored admin set of `chat` with the platform's list.
    pub async fn refresh_admins(&self, chat: ChatId) -> Result<PolicySettings> {
        let admins = self
            .platform
            .get_chat_administrators(chat)
            .await
            .map_err(|e| BotError::platform(chat, e))?;
        let chat_admins: ChatAdmins = admins.iter().map(|m| m.user.id).collect();

        let mut settings = self.registry.settings(chat).await?.unwrap_or_default();
        if settings.chat_admins != chat_admins {
            debug!(chat = %chat, admins = chat_admins.len(), "admin list changed");
            settings.chat_admins = chat_admins;
            self.registry.save_settings(chat, &settings).await?;
        }
        Ok(settings)
    }

    /// Persist a policy and mirror its `hidden` flag onto the chat record,
    /// which the directory reads without touching the policy table.
    pub async fn store_settings(&self, chat: ChatId, settings: &PolicySettings) -> Result<()> {
        self.registry.save_settings(chat, settings).await?;
        if let Some(mut record) = self.registry.get(chat).await? {
            if record.hidden != settings.hidden {
                record.hidden = settings.hidden;
                self.registry.upsert(&record).await?;
            }
        }
        Ok(())
    }

    /// The stored policy of `chat` if `user` may change it.
    pub async fn authorize(&self, user: UserId, chat: ChatId) -> Result<PolicySettings> {
        let settings = self
            .registry
            .settings(chat)
            .await?
            .ok_or_else(|| BotError::NotFound(format!("settings of chat {chat}")))?;

        if self.is_global_admin(user) || settings.chat_admins.is_admin(user) {
            Ok(settings)
        } else {
            warn!(chat = %chat, user = %user, "non-admin tried to change chat policy");
            Err(BotError::Unauthorized { chat })
        }
    }

    /// Like [`BotContext::authorize`], but re-reads the admin list from the
    /// platform first.
    pub async fn authorize_live(&self, user: UserId, chat: ChatId) -> Result<PolicySettings> {
        if !self.is_global_admin(user) {
            self.refresh_admins(chat).await?;
        }
        self.authorize(user, chat).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use warden_shared::mock::MockPlatform;
    use warden_shared::{ChatKind, ChatRecord, ChatId, UserId};
    use warden_store::{CategoryAssignments, MemoryKv, Registry};

    use super::BotContext;
    use crate::blacklist::{Blacklist, NoBlacklist};
    use crate::config::BotConfig;

    pub const BOT_ID: i64 = 42;
    pub const GLOBAL_ADMIN: i64 = 1;

    pub fn group(id: i64, title: &str) -> ChatRecord {
        ChatRecord::new(ChatId(id), ChatKind::Supergroup, title)
    }

    pub async fn context_with(
        assignments: CategoryAssignments,
        blacklist: Arc<dyn Blacklist>,
    ) -> (Arc<MockPlatform>, Arc<BotContext>) {
        let platform = Arc::new(MockPlatform::new(BOT_ID));
        let registry = Registry::new(Arc::new(MemoryKv::new()));
        let config = BotConfig {
            global_admins: [UserId(GLOBAL_ADMIN)].into_iter().collect(),
            ..BotConfig::default()
        };
        let ctx = BotContext::new(platform.clone(), registry, config, assignments, blacklist)
            .await
            .unwrap();
        (platform, Arc::new(ctx))
    }

    pub async fn context() -> (Arc<MockPlatform>, Arc<BotContext>) {
        context_with(CategoryAssignments::default(), Arc::new(NoBlacklist)).await
    }
}
