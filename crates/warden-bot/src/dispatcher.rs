//! Per-event moderation decisions.
//!
//! Each event is received, classified against the chat's policy and either
//! suppressed or enforced. Nothing is kept between events apart from the
//! enforcement guard.

use tracing::{debug, info, warn};
use warden_shared::classify::{arabic_ratio, chinese_ratio};
use warden_shared::{
    Action, ChatId, ChatRecord, MessageRef, PolicySettings, Trigger, User, UserId,
};

use crate::context::{BotContext, Metrics};
use crate::error::Result;

#[derive(Debug, Clone)]
pub enum ModerationEvent {
    Join {
        chat: ChatRecord,
        user: User,
        notice: Option<MessageRef>,
    },
    Message {
        chat: ChatRecord,
        sender: User,
        message: MessageRef,
        text: String,
    },
    Leave {
        chat: ChatRecord,
        user: User,
        notice: Option<MessageRef>,
    },
}

impl ModerationEvent {
    fn chat(&self) -> &ChatRecord {
        match self {
            ModerationEvent::Join { chat, .. }
            | ModerationEvent::Message { chat, .. }
            | ModerationEvent::Leave { chat, .. } => chat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    BotDisabled,
    /// The member was already handled within the dedup window.
    AlreadyEnforced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Suppressed(Suppression),
    /// Classified, nothing matched.
    Clean,
    Enforced { trigger: Trigger, action: Action },
}

pub async fn dispatch(ctx: &BotContext, event: ModerationEvent) -> Result<Outcome> {
    let chat_id = event.chat().id;
    let settings = ctx.settings_for(event.chat()).await?;

    if let ModerationEvent::Leave { notice, .. } = &event {
        if settings.delete_leave_message {
            if let Some(notice) = notice {
                delete_best_effort(ctx, *notice).await;
            }
        }
        return Ok(Outcome::Clean);
    }

    if !settings.bot_enabled {
        Metrics::incr(&ctx.metrics.suppressed);
        return Ok(Outcome::Suppressed(Suppression::BotDisabled));
    }

    let (user, text, triggers) = match &event {
        ModerationEvent::Join { user, .. } => (user, join_text(user), Trigger::ON_JOIN),
        ModerationEvent::Message { sender, text, .. } => {
            (sender, text.clone(), Trigger::ON_MESSAGE)
        }
        ModerationEvent::Leave { .. } => return Ok(Outcome::Clean),
    };

    let Some((trigger, action)) = classify(ctx, &settings, &triggers, user.id, &text).await else {
        return Ok(Outcome::Clean);
    };

    let claimed = ctx.guard.try_claim(chat_id, user.id).await;
    if claimed {
        info!(
            chat = %chat_id,
            user = %user.id,
            name = %user.display_name(),
            %trigger,
            action = action.label(),
            "enforcing policy"
        );
        if !apply_action(ctx, chat_id, user.id, action).await {
            ctx.guard.release(chat_id, user.id).await;
        }
        if let ModerationEvent::Join { notice: Some(notice), .. } = &event {
            if settings.delete_join_message {
                delete_best_effort(ctx, *notice).await;
            }
        }
    } else {
        debug!(chat = %chat_id, user = %user.id, %trigger, "member already handled, skipping action");
    }

    // Offending content goes regardless of the guard.
    if let ModerationEvent::Message { message, .. } = &event {
        delete_best_effort(ctx, *message).await;
    }

    if !claimed {
        Metrics::incr(&ctx.metrics.suppressed);
        return Ok(Outcome::Suppressed(Suppression::AlreadyEnforced));
    }
    Ok(Outcome::Enforced { trigger, action })
}

/// Name fields a joining member is judged by.
fn join_text(user: &User) -> String {
    let mut text = user.display_name();
    if let Some(username) = &user.username {
        text.push(' ');
        text.push_str(username);
    }
    text
}

/// First trigger, in `order`, whose action is set and whose classifier
/// matches. Classifiers of triggers set to `None` are not run.
async fn classify(
    ctx: &BotContext,
    settings: &PolicySettings,
    order: &[Trigger],
    user: UserId,
    text: &str,
) -> Option<(Trigger, Action)> {
    for &trigger in order {
        let action = settings.action(trigger);
        if action.is_none() {
            continue;
        }
        let matched = match trigger {
            Trigger::JoinArabic | Trigger::MessageArabic => {
                arabic_ratio(text) > ctx.config.arabic_threshold
            }
            Trigger::JoinChinese | Trigger::MessageChinese => {
                chinese_ratio(text) > ctx.config.chinese_threshold
            }
            Trigger::BlacklistHit => match ctx.blacklist.is_listed(user).await {
                Ok(listed) => listed,
                Err(e) => {
                    warn!(user = %user, error = %e, "blacklist lookup failed");
                    false
                }
            },
        };
        if matched {
            return Some((trigger, action));
        }
    }
    None
}

/// Apply `action` to `user`. Failures are logged and counted, never
/// returned; the result tells whether the platform accepted the call.
pub async fn apply_action(ctx: &BotContext, chat: ChatId, user: UserId, action: Action) -> bool {
    let result = match action {
        Action::None => return true,
        Action::Kick => ctx.platform.kick_member(chat, user).await,
        Action::Ban => ctx.platform.ban_member(chat, user).await,
    };
    match result {
        Ok(()) => {
            Metrics::incr(&ctx.metrics.enforcements);
            true
        }
        Err(e) => {
            Metrics::incr(&ctx.metrics.enforcement_failures);
            warn!(chat = %chat, user = %user, action = action.label(), error = %e, "enforcement failed");
            false
        }
    }
}

async fn delete_best_effort(ctx: &BotContext, message: MessageRef) {
    if let Err(e) = ctx.platform.delete_message(message).await {
        warn!(chat = %message.chat, message = message.id, error = %e, "can't delete message");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use warden_shared::mock::{user, Call, MockPlatform};
    use warden_shared::PolicySettings;
    use warden_store::CategoryAssignments;

    use super::*;
    use crate::blacklist::{Blacklist, BlacklistError};
    use crate::context::testing::*;

    async fn setup(settings: PolicySettings) -> (Arc<MockPlatform>, Arc<BotContext>, ChatRecord) {
        setup_with(settings, Arc::new(crate::blacklist::NoBlacklist)).await
    }

    async fn setup_with(
        settings: PolicySettings,
        blacklist: Arc<dyn Blacklist>,
    ) -> (Arc<MockPlatform>, Arc<BotContext>, ChatRecord) {
        let (platform, ctx) = context_with(CategoryAssignments::default(), blacklist).await;
        let chat = group(-100, "Linear algebra");
        platform.add_chat(chat.clone());
        ctx.settings_for(&chat).await.unwrap();
        ctx.registry.save_settings(chat.id, &settings).await.unwrap();
        (platform, ctx, chat)
    }

    fn join(chat: &ChatRecord, name: &str, notice: i64) -> ModerationEvent {
        ModerationEvent::Join {
            chat: chat.clone(),
            user: user(500, name),
            notice: Some(MessageRef { chat: chat.id, id: notice }),
        }
    }

    #[tokio::test]
    async fn arabic_join_is_banned_once_with_one_deletion() {
        let settings = PolicySettings {
            bot_enabled: true,
            delete_join_message: true,
            on_join_arabic: Action::Ban,
            ..PolicySettings::default()
        };
        let (platform, ctx, chat) = setup(settings).await;
        platform.clear_calls();

        let outcome = dispatch(&ctx, join(&chat, "محمد عبد الله", 77)).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Enforced {
                trigger: Trigger::JoinArabic,
                action: Action::Ban
            }
        );

        // The same event delivered twice.
        let again = dispatch(&ctx, join(&chat, "محمد عبد الله", 77)).await.unwrap();
        assert_eq!(again, Outcome::Suppressed(Suppression::AlreadyEnforced));

        assert_eq!(platform.count(|c| matches!(c, Call::Ban { .. })), 1);
        assert_eq!(platform.count(|c| matches!(c, Call::Kick { .. })), 0);
        assert_eq!(
            platform.count(|c| matches!(c, Call::Delete(m) if m.id == 77)),
            1
        );
        assert_eq!(ctx.metrics.snapshot().enforcements, 1);
    }

    #[tokio::test]
    async fn disabled_bot_suppresses_everything() {
        let settings = PolicySettings {
            bot_enabled: false,
            on_join_arabic: Action::Ban,
            ..PolicySettings::default()
        };
        let (platform, ctx, chat) = setup(settings).await;
        platform.clear_calls();

        let outcome = dispatch(&ctx, join(&chat, "محمد", 1)).await.unwrap();
        assert_eq!(outcome, Outcome::Suppressed(Suppression::BotDisabled));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn latin_name_is_clean_and_notice_kept() {
        let settings = PolicySettings {
            bot_enabled: true,
            delete_join_message: true,
            on_join_arabic: Action::Ban,
            on_join_chinese: Action::Ban,
            ..PolicySettings::default()
        };
        let (platform, ctx, chat) = setup(settings).await;
        platform.clear_calls();

        let outcome = dispatch(&ctx, join(&chat, "Giulia Rossi", 3)).await.unwrap();
        assert_eq!(outcome, Outcome::Clean);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn chinese_message_kicks_sender_and_deletes_message() {
        let settings = PolicySettings {
            bot_enabled: true,
            on_message_chinese: Action::Kick,
            ..PolicySettings::default()
        };
        let (platform, ctx, chat) = setup(settings).await;
        platform.clear_calls();

        let message = MessageRef { chat: chat.id, id: 10 };
        let event = ModerationEvent::Message {
            chat: chat.clone(),
            sender: user(600, "spam"),
            message,
            text: "免费加入我们的投资群组".into(),
        };
        let outcome = dispatch(&ctx, event).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Enforced {
                trigger: Trigger::MessageChinese,
                action: Action::Kick
            }
        );
        assert_eq!(
            platform.calls(),
            vec![
                Call::Kick { chat: chat.id, user: UserId(600) },
                Call::Delete(message)
            ]
        );
    }

    fn spam(chat: &ChatRecord, id: i64) -> ModerationEvent {
        ModerationEvent::Message {
            chat: chat.clone(),
            sender: user(600, "spam"),
            message: MessageRef { chat: chat.id, id },
            text: "免费加入我们的投资群组".into(),
        }
    }

    fn deleted_ids(platform: &MockPlatform) -> Vec<i64> {
        platform
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(m) => Some(m.id),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn message_burst_is_deleted_but_sender_kicked_once() {
        let settings = PolicySettings {
            bot_enabled: true,
            on_message_chinese: Action::Kick,
            ..PolicySettings::default()
        };
        let (platform, ctx, chat) = setup(settings).await;
        platform.clear_calls();

        let mut outcomes = Vec::new();
        for id in [10, 11, 12] {
            outcomes.push(dispatch(&ctx, spam(&chat, id)).await.unwrap());
        }

        assert_eq!(
            outcomes,
            vec![
                Outcome::Enforced {
                    trigger: Trigger::MessageChinese,
                    action: Action::Kick
                },
                Outcome::Suppressed(Suppression::AlreadyEnforced),
                Outcome::Suppressed(Suppression::AlreadyEnforced),
            ]
        );
        assert_eq!(deleted_ids(&platform), vec![10, 11, 12]);
        assert_eq!(platform.count(|c| matches!(c, Call::Kick { .. })), 1);
    }

    #[tokio::test]
    async fn failed_kick_is_retried_on_next_message() {
        let settings = PolicySettings {
            bot_enabled: true,
            on_message_chinese: Action::Kick,
            ..PolicySettings::default()
        };
        let (platform, ctx, chat) = setup(settings).await;
        platform.clear_calls();
        platform.rate_limit_enforcements(1);

        dispatch(&ctx, spam(&chat, 10)).await.unwrap();
        let retried = dispatch(&ctx, spam(&chat, 11)).await.unwrap();
        let after = dispatch(&ctx, spam(&chat, 12)).await.unwrap();

        assert!(matches!(retried, Outcome::Enforced { .. }));
        assert_eq!(after, Outcome::Suppressed(Suppression::AlreadyEnforced));
        assert_eq!(platform.count(|c| matches!(c, Call::Kick { .. })), 2);
        assert_eq!(deleted_ids(&platform), vec![10, 11, 12]);

        let metrics = ctx.metrics.snapshot();
        assert_eq!(metrics.enforcements, 1);
        assert_eq!(metrics.enforcement_failures, 1);
    }

    struct AlwaysListed;

    #[async_trait]
    impl Blacklist for AlwaysListed {
        async fn is_listed(&self, _user: UserId) -> std::result::Result<bool, BlacklistError> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn first_matching_trigger_wins() {
        let settings = PolicySettings {
            bot_enabled: true,
            on_join_arabic: Action::Ban,
            on_blacklist_hit: Action::Kick,
            ..PolicySettings::default()
        };
        let (_, ctx, chat) = setup_with(settings, Arc::new(AlwaysListed)).await;

        // Both the name and the blacklist match; Arabic is evaluated first.
        let outcome = dispatch(&ctx, join(&chat, "محمد", 1)).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Enforced {
                trigger: Trigger::JoinArabic,
                action: Action::Ban
            }
        );

        // A Latin name falls through to the blacklist trigger.
        let event = ModerationEvent::Join {
            chat: chat.clone(),
            user: user(501, "John"),
            notice: None,
        };
        assert_eq!(
            dispatch(&ctx, event).await.unwrap(),
            Outcome::Enforced {
                trigger: Trigger::BlacklistHit,
                action: Action::Kick
            }
        );
    }

    #[tokio::test]
    async fn leave_notice_deleted_only_when_flag_set() {
        let settings = PolicySettings {
            bot_enabled: true,
            delete_leave_message: true,
            ..PolicySettings::default()
        };
        let (platform, ctx, chat) = setup(settings).await;
        platform.clear_calls();

        let notice = MessageRef { chat: chat.id, id: 5 };
        let outcome = dispatch(
            &ctx,
            ModerationEvent::Leave {
                chat: chat.clone(),
                user: user(9, "someone"),
                notice: Some(notice),
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Clean);
        assert_eq!(platform.calls(), vec![Call::Delete(notice)]);
    }

    #[tokio::test]
    async fn unknown_chat_is_registered_on_first_event() {
        let (platform, ctx) = context().await;
        let chat = group(-300, "New group");
        platform.add_chat(chat.clone());

        let outcome = dispatch(&ctx, join(&chat, "Anna", 1)).await.unwrap();
        assert_eq!(outcome, Outcome::Suppressed(Suppression::BotDisabled));
        assert!(ctx.registry.get(chat.id).await.unwrap().is_some());
    }
}
