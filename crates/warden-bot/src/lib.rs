//! # warden-bot
//!
//! Moderation bot service for a federation of chat groups.
//!
//! The embedding process implements [`PlatformClient`] for its chat
//! platform, builds a [`Bot`] and hands it every inbound [`Update`]. Each
//! update runs on its own task; the only shared state is the registry, the
//! read-only configuration and the metrics counters.
//!
//! ## Modules
//!
//! - [`dispatcher`]: per-event classification and enforcement
//! - [`control`]: settings view and authorization-gated policy mutations
//! - [`audit`]: the bot's own administrator rights in every chat
//! - [`directory`]: public group listing by category
//! - [`commands`]: slash command routing
//! - [`refresh`]: background metadata refresh

pub mod audit;
pub mod blacklist;
pub mod callback;
pub mod commands;
pub mod config;
pub mod context;
pub mod control;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod refresh;
pub mod telemetry;
pub mod update;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_shared::{OutgoingMessage, PlatformClient};
use warden_store::{Registry, SqliteKv};

pub use crate::blacklist::{Blacklist, CasBlacklist, NoBlacklist};
pub use crate::config::BotConfig;
pub use crate::context::BotContext;
pub use crate::error::{BotError, Result};
pub use crate::update::{CallbackQuery, IncomingMessage, Update};

use crate::callback::{CallbackData, HelpTarget};
use crate::context::Metrics;
use crate::dispatcher::ModerationEvent;

#[derive(Clone)]
pub struct Bot {
    ctx: Arc<BotContext>,
}

impl Bot {
    pub fn new(ctx: BotContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    /// Build a bot from configuration: SQLite registry, category file and
    /// CAS lookup as configured.
    pub async fn from_config(
        config: BotConfig,
        platform: Arc<dyn PlatformClient>,
    ) -> anyhow::Result<Self> {
        let store = SqliteKv::open_at(&config.database_path).with_context(|| {
            format!("opening database at {}", config.database_path.display())
        })?;
        let assignments = config.load_categories()?;
        info!(categories = assignments.len(), "category assignments loaded");

        let blacklist: Arc<dyn Blacklist> = if config.cas_enabled {
            Arc::new(CasBlacklist::new(config.cas_url.clone()).context("building CAS client")?)
        } else {
            info!("CAS blacklist disabled");
            Arc::new(NoBlacklist)
        };

        let ctx = BotContext::new(
            platform,
            Registry::new(Arc::new(store)),
            config,
            assignments,
            blacklist,
        )
        .await
        .context("resolving bot identity")?;

        Ok(Self::new(ctx))
    }

    pub fn context(&self) -> &Arc<BotContext> {
        &self.ctx
    }

    /// Handle `update` on its own task.
    pub fn spawn(&self, update: Update) -> JoinHandle<()> {
        let bot = self.clone();
        tokio::spawn(async move { bot.handle_update(update).await })
    }

    /// Start the metadata refresh loop and the enforcement guard purge.
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let purge_every = self.ctx.config.dedup_window.max(Duration::from_secs(60));
        vec![
            refresh::spawn_refresh_loop(self.ctx.clone()),
            refresh::spawn_guard_purge(self.ctx.guard.clone(), purge_every),
        ]
    }

    pub async fn handle_update(&self, update: Update) {
        Metrics::incr(&self.ctx.metrics.updates);
        let kind = update.kind();
        if let Err(e) = self.route(update).await {
            if e.is_internal() {
                error!(update = kind, error = %e, "update handling failed");
            } else {
                warn!(update = kind, error = %e, "update not handled");
            }
        }
    }

    async fn route(&self, update: Update) -> Result<()> {
        let ctx = self.ctx.as_ref();
        match update {
            Update::Message(msg) => {
                if msg.is_command() && commands::handle(ctx, &msg).await {
                    return Ok(());
                }
                if msg.is_private() {
                    return Ok(());
                }
                dispatcher::dispatch(
                    ctx,
                    ModerationEvent::Message {
                        chat: msg.chat,
                        sender: msg.sender,
                        message: msg.message,
                        text: msg.text,
                    },
                )
                .await?;
            }
            Update::MemberJoined { chat, user, .. } if user.id == ctx.me.id => {
                self.on_bot_added(chat).await?;
            }
            Update::MemberJoined { chat, user, notice } => {
                dispatcher::dispatch(ctx, ModerationEvent::Join { chat, user, notice }).await?;
            }
            Update::MemberLeft { chat, user, .. } if user.id == ctx.me.id => {
                self.on_bot_removed(chat.id).await?;
            }
            Update::MemberLeft { chat, user, notice } => {
                dispatcher::dispatch(ctx, ModerationEvent::Leave { chat, user, notice }).await?;
            }
            Update::BotAdded { chat } => self.on_bot_added(chat).await?,
            Update::BotRemoved { chat } => self.on_bot_removed(chat).await?,
            Update::Callback(query) => self.on_callback(query).await,
        }
        Ok(())
    }

    async fn on_bot_added(&self, chat: warden_shared::ChatRecord) -> Result<()> {
        info!(chat = %chat.id, title = %chat.title, "bot added to chat");
        self.ctx.register_chat(&chat).await?;
        Ok(())
    }

    async fn on_bot_removed(&self, chat: warden_shared::ChatId) -> Result<()> {
        info!(chat = %chat, "bot removed from chat");
        self.ctx.registry.delete(chat).await?;
        Ok(())
    }

    async fn on_callback(&self, query: CallbackQuery) {
        let ctx = self.ctx.as_ref();
        let data = match query.data.parse::<CallbackData>() {
            Ok(data) => data,
            Err(e) => {
                control::answer_error(ctx, &query, &e).await;
                return;
            }
        };
        debug!(user = %query.from.id, ?data, "callback");

        match data {
            CallbackData::Settings { chat, mutation } => {
                control::on_settings_button(ctx, &query, chat, mutation).await;
            }
            CallbackData::Select(chat) => control::on_select(ctx, &query, chat).await,
            CallbackData::Category(which) => {
                match directory::category_view(ctx, which).await {
                    Ok(view) => {
                        control::answer(ctx, &query, "", false).await;
                        self.edit_or_log(&query, view).await;
                    }
                    Err(e) => control::answer_error(ctx, &query, &e).await,
                }
            }
            CallbackData::Help(target) => {
                control::answer(ctx, &query, "", false).await;
                let view = match target {
                    HelpTarget::Groups => directory::groups_menu(ctx).await,
                    HelpTarget::Settings => control::settings_picker(ctx, query.from.id).await,
                };
                match view {
                    Ok(view) => self.edit_or_log(&query, view).await,
                    Err(e) => error!(user = %query.from.id, error = %e, "can't build help view"),
                }
            }
            CallbackData::Close => {
                control::answer(ctx, &query, "", false).await;
                if let Err(e) = ctx.platform.delete_message(query.message).await {
                    warn!(error = %e, "can't delete closed message");
                }
            }
        }
    }

    async fn edit_or_log(&self, query: &CallbackQuery, view: OutgoingMessage) {
        if let Err(e) = self.ctx.platform.edit_message(query.message, view).await {
            warn!(chat = %query.message.chat, error = %e, "can't edit message");
        }
    }
}

#[cfg(test)]
mod tests {
    use warden_shared::mock::{user, Call};
    use warden_shared::{Action, ChatId, MessageRef, PolicySettings, UserId};

    use super::*;
    use crate::callback::Mutation;
    use crate::context::testing::*;

    async fn bot() -> (Arc<warden_shared::mock::MockPlatform>, Bot) {
        let (platform, ctx) = context().await;
        (platform, Bot { ctx })
    }

    #[tokio::test]
    async fn bot_lifecycle_registers_and_forgets_chat() {
        let (platform, bot) = bot().await;
        let chat = group(-10, "Topology");
        platform.add_chat(chat.clone());
        platform.set_admins(chat.id, &[7]);

        bot.handle_update(Update::BotAdded { chat: chat.clone() }).await;
        let settings = bot.context().registry.settings(chat.id).await.unwrap().unwrap();
        assert!(settings.chat_admins.is_admin(UserId(7)));

        bot.handle_update(Update::MemberLeft {
            chat: chat.clone(),
            user: user(BOT_ID, "Warden"),
            notice: None,
        })
        .await;
        assert!(bot.context().registry.get(chat.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn spawned_updates_are_enforced() {
        let (platform, bot) = bot().await;
        let chat = group(-10, "Topology");
        platform.add_chat(chat.clone());
        bot.handle_update(Update::BotAdded { chat: chat.clone() }).await;
        bot.context()
            .registry
            .save_settings(
                chat.id,
                &PolicySettings {
                    bot_enabled: true,
                    on_message_arabic: Action::Kick,
                    ..PolicySettings::default()
                },
            )
            .await
            .unwrap();

        let msg = IncomingMessage {
            message: MessageRef { chat: chat.id, id: 3 },
            chat: chat.clone(),
            sender: user(77, "x"),
            text: "اشترك في قناتنا الآن".into(),
        };
        bot.spawn(Update::Message(msg)).await.unwrap();

        assert!(platform.calls().contains(&Call::Kick { chat: chat.id, user: UserId(77) }));
        assert_eq!(bot.context().metrics.snapshot().updates, 2);
    }

    #[tokio::test]
    async fn callbacks_are_routed_by_payload() {
        let (platform, bot) = bot().await;
        let chat = group(-10, "Topology");
        platform.add_chat(chat.clone());
        platform.set_admins(chat.id, &[7]);
        bot.handle_update(Update::BotAdded { chat: chat.clone() }).await;

        let press = |data: String| {
            Update::Callback(CallbackQuery {
                id: "q".into(),
                from: user(7, "admin"),
                message: MessageRef { chat: ChatId(7), id: 50 },
                data,
            })
        };

        bot.handle_update(press(
            CallbackData::Settings {
                chat: chat.id,
                mutation: Mutation::Flag(warden_shared::PolicyFlag::BotEnabled),
            }
            .to_string(),
        ))
        .await;
        assert!(bot.context().registry.settings(chat.id).await.unwrap().unwrap().bot_enabled);

        platform.clear_calls();
        bot.handle_update(press("garbage".into())).await;
        assert_eq!(
            platform.calls(),
            vec![Call::Answer {
                text: warden_shared::constants::GENERIC_APOLOGY.into(),
                alert: true
            }]
        );

        platform.clear_calls();
        bot.handle_update(press("close".into())).await;
        assert!(platform
            .calls()
            .contains(&Call::Delete(MessageRef { chat: ChatId(7), id: 50 })));
    }

    #[tokio::test]
    async fn private_text_is_not_moderated() {
        let (platform, bot) = bot().await;
        let dm = warden_shared::ChatRecord::new(ChatId(5), warden_shared::ChatKind::Private, "");
        bot.handle_update(Update::Message(IncomingMessage {
            message: MessageRef { chat: dm.id, id: 1 },
            chat: dm,
            sender: user(5, "someone"),
            text: "hello".into(),
        }))
        .await;
        assert!(platform.calls().is_empty());
        assert_eq!(bot.context().registry.count().await.unwrap(), 0);
    }
}
