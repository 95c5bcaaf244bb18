//! The settings view and the mutations behind its buttons.
//!
//! A mutation reads the stored policy, applies one pure transform, writes
//! it back and renders the view from a fresh read of what was written.
//! Concurrent edits of the same chat are last-write-wins.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use warden_shared::{
    Action, ChatId, ChatRecord, InlineButton, MessageRef, OutgoingMessage, ParseMode,
    PolicyFlag, PolicySettings, Trigger, UserId,
};

use crate::callback::{CallbackData, Mutation};
use crate::context::BotContext;
use crate::error::{BotError, Result};
use crate::update::CallbackQuery;

const NO_ADMIN_CHATS: &str = "You are not an admin in a chat where the bot is.";

fn check_line(on: bool, yes: &str, no: &str) -> String {
    if on {
        format!("✅ {yes}\n")
    } else {
        format!("❌ {no}\n")
    }
}

pub fn settings_text(record: &ChatRecord, settings: &PolicySettings, now: DateTime<Utc>) -> String {
    let mut out = format!("Bot settings for chat {} ({})\n\n", record.title, record.id);

    out.push_str(&check_line(settings.bot_enabled, "Bot enabled", "Bot disabled"));
    out.push_str(if settings.hidden {
        "⛔️ Group hidden\n"
    } else {
        "👀 Group visible\n"
    });
    out.push_str(&check_line(
        settings.delete_join_message,
        "Delete join message (after spam detection)",
        "Do not delete join messages",
    ));
    out.push_str(&check_line(
        settings.delete_leave_message,
        "Delete leave message",
        "Do not delete leave messages",
    ));

    let action = |t: Trigger| settings.action(t).label();
    out.push_str("\n🇨🇳 *Chinese* blocker:\n");
    out.push_str(&format!("On join: *{}*\n", action(Trigger::JoinChinese)));
    out.push_str(&format!("On message: *{}*\n", action(Trigger::MessageChinese)));
    out.push_str("\n☪️ *Arabic* blocker:\n");
    out.push_str(&format!("On join: *{}*\n", action(Trigger::JoinArabic)));
    out.push_str(&format!("On message: *{}*\n", action(Trigger::MessageArabic)));
    out.push_str("\nCAS blacklist (see https://cas.chat/ ):\n");
    out.push_str(&format!("On any action: *{}*\n", action(Trigger::BlacklistHit)));

    out.push_str(&format!("\nGenerated at: {}", now.format("%Y-%m-%d %H:%M:%S UTC")));
    out
}

fn toggle_label(mutation: Mutation, settings: &PolicySettings) -> String {
    match mutation {
        Mutation::Refresh => "🔄 Refresh".into(),
        Mutation::Flag(PolicyFlag::BotEnabled) if settings.bot_enabled => "❌ Disable bot".into(),
        Mutation::Flag(PolicyFlag::BotEnabled) => "✅ Enable bot".into(),
        Mutation::Flag(PolicyFlag::Hidden) if settings.hidden => "👀 Show group".into(),
        Mutation::Flag(PolicyFlag::Hidden) => "⛔️ Hide group".into(),
        Mutation::Flag(PolicyFlag::DeleteJoinMessage) if settings.delete_join_message => {
            "❌ Don't del join msgs".into()
        }
        Mutation::Flag(PolicyFlag::DeleteJoinMessage) => "✅ Del join msgs".into(),
        Mutation::Flag(PolicyFlag::DeleteLeaveMessage) if settings.delete_leave_message => {
            "❌ Don't del leave msgs".into()
        }
        Mutation::Flag(PolicyFlag::DeleteLeaveMessage) => "✅ Del leave msgs".into(),
        Mutation::Trigger(Trigger::BlacklistHit) if settings.on_blacklist_hit.is_none() => {
            "❌ CAS disabled".into()
        }
        Mutation::Trigger(Trigger::BlacklistHit) => "✅ CAS enabled".into(),
        Mutation::Trigger(trigger) => {
            let (verb, what) = match trigger.designated_action() {
                Action::Ban => ("Ban", "joins"),
                _ => ("Kick", "msgs"),
            };
            let script = match trigger {
                Trigger::JoinArabic | Trigger::MessageArabic => "Arabic",
                _ => "Chinese",
            };
            if settings.action(trigger).is_none() {
                format!("✅ {verb} {script} {what}")
            } else {
                format!("❌ Don't {} {script} {what}", verb.to_lowercase())
            }
        }
    }
}

pub fn settings_keyboard(chat: ChatId, settings: &PolicySettings) -> Vec<Vec<InlineButton>> {
    let button = |mutation: Mutation| {
        InlineButton::new(
            toggle_label(mutation, settings),
            CallbackData::Settings { chat, mutation }.to_string(),
        )
    };
    vec![
        vec![
            button(Mutation::Refresh),
            button(Mutation::Flag(PolicyFlag::BotEnabled)),
        ],
        vec![button(Mutation::Flag(PolicyFlag::Hidden))],
        vec![
            button(Mutation::Flag(PolicyFlag::DeleteJoinMessage)),
            button(Mutation::Flag(PolicyFlag::DeleteLeaveMessage)),
        ],
        vec![
            button(Mutation::Trigger(Trigger::JoinChinese)),
            button(Mutation::Trigger(Trigger::JoinArabic)),
        ],
        vec![
            button(Mutation::Trigger(Trigger::MessageChinese)),
            button(Mutation::Trigger(Trigger::MessageArabic)),
        ],
        vec![button(Mutation::Trigger(Trigger::BlacklistHit))],
        vec![InlineButton::new("Close", CallbackData::Close.to_string())],
    ]
}

pub fn render_settings(record: &ChatRecord, settings: &PolicySettings) -> OutgoingMessage {
    OutgoingMessage::text(settings_text(record, settings, Utc::now()))
        .with_mode(ParseMode::Markdown)
        .with_keyboard(settings_keyboard(record.id, settings))
}

fn apply(settings: PolicySettings, mutation: Mutation) -> PolicySettings {
    match mutation {
        Mutation::Refresh => settings,
        Mutation::Flag(flag) => settings.toggled_flag(flag),
        Mutation::Trigger(trigger) => settings.toggled_trigger(trigger),
    }
}

/// Authorize `actor`, apply `mutation` to the policy of `chat` and return
/// the record and policy as stored afterwards.
pub async fn mutate(
    ctx: &BotContext,
    actor: UserId,
    chat: ChatId,
    mutation: Mutation,
) -> Result<(ChatRecord, PolicySettings)> {
    let current = ctx.authorize(actor, chat).await?;
    let record = ctx
        .registry
        .get(chat)
        .await?
        .ok_or_else(|| BotError::NotFound(format!("chat {chat}")))?;

    if mutation != Mutation::Refresh {
        let next = apply(current, mutation);
        ctx.store_settings(chat, &next).await?;
        info!(chat = %chat, actor = %actor, change = mutation.tag(), "policy updated");
    }

    let stored = ctx
        .registry
        .settings(chat)
        .await?
        .ok_or_else(|| BotError::NotFound(format!("settings of chat {chat}")))?;
    Ok((record, stored))
}

/// Answer a callback, logging instead of failing.
pub async fn answer(ctx: &BotContext, query: &CallbackQuery, text: &str, alert: bool) {
    if let Err(e) = ctx.platform.answer_callback(&query.id, text, alert).await {
        warn!(user = %query.from.id, error = %e, "can't answer callback");
    }
}

/// Reply to a failed callback. Rejections are explicit; everything else
/// gets the generic text.
pub async fn answer_error(ctx: &BotContext, query: &CallbackQuery, err: &BotError) {
    if err.is_internal() {
        error!(user = %query.from.id, data = %query.data, error = %err, "callback failed");
    } else {
        warn!(user = %query.from.id, data = %query.data, error = %err, "callback rejected");
    }
    answer(ctx, query, err.user_message(), true).await;
}

/// Handle a button of the settings view.
pub async fn on_settings_button(
    ctx: &BotContext,
    query: &CallbackQuery,
    chat: ChatId,
    mutation: Mutation,
) {
    match mutate(ctx, query.from.id, chat, mutation).await {
        Ok((record, stored)) => {
            if let Err(e) = ctx
                .platform
                .edit_message(query.message, render_settings(&record, &stored))
                .await
            {
                warn!(chat = %chat, error = %e, "can't re-render settings");
            }
            answer(ctx, query, "Ok", false).await;
        }
        Err(e) => answer_error(ctx, query, &e).await,
    }
}

/// Send the settings view of `chat` into `to`.
pub async fn send_settings(
    ctx: &BotContext,
    to: ChatId,
    actor: UserId,
    chat: ChatId,
) -> Result<MessageRef> {
    let (record, stored) = mutate(ctx, actor, chat, Mutation::Refresh).await?;
    ctx.platform
        .send_message(to, render_settings(&record, &stored))
        .await
        .map_err(|e| BotError::platform(to, e))
}

/// Chats whose policy `actor` may edit, by title. Admin lists are re-read
/// from the platform for every chat unless `actor` is a global admin.
pub async fn editable_chats(ctx: &BotContext, actor: UserId) -> Result<Vec<ChatRecord>> {
    let mut chats = ctx.registry.list().await?;
    chats.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

    if ctx.is_global_admin(actor) {
        return Ok(chats);
    }

    let mut editable = Vec::new();
    for chat in chats {
        match ctx.refresh_admins(chat.id).await {
            Ok(settings) if settings.chat_admins.is_admin(actor) => editable.push(chat),
            Ok(_) => {}
            Err(e) => warn!(chat = %chat.id, error = %e, "can't re-check admins"),
        }
    }
    Ok(editable)
}

/// Whether `actor` may edit at least one chat. Stops at the first chat
/// whose live admin list contains `actor`.
pub async fn can_edit_any(ctx: &BotContext, actor: UserId) -> Result<bool> {
    if ctx.is_global_admin(actor) {
        return Ok(true);
    }
    for chat in ctx.registry.list().await? {
        match ctx.refresh_admins(chat.id).await {
            Ok(settings) if settings.chat_admins.is_admin(actor) => return Ok(true),
            Ok(_) => {}
            Err(e) => warn!(chat = %chat.id, error = %e, "can't re-check admins"),
        }
    }
    Ok(false)
}

/// The private chat picker.
pub async fn settings_picker(ctx: &BotContext, actor: UserId) -> Result<OutgoingMessage> {
    let chats = editable_chats(ctx, actor).await?;
    if chats.is_empty() {
        return Ok(OutgoingMessage::text(NO_ADMIN_CHATS));
    }
    let keyboard = chats
        .iter()
        .map(|c| vec![InlineButton::new(c.title.clone(), CallbackData::Select(c.id).to_string())])
        .collect();
    Ok(OutgoingMessage::text("Please select the chatroom:").with_keyboard(keyboard))
}

/// A chat was picked: replace the picker with that chat's settings view.
pub async fn on_select(ctx: &BotContext, query: &CallbackQuery, chat: ChatId) {
    let result: Result<MessageRef> = async {
        ctx.authorize_live(query.from.id, chat).await?;
        send_settings(ctx, query.message.chat, query.from.id, chat).await
    }
    .await;

    match result {
        Ok(_) => {
            if let Err(e) = ctx.platform.delete_message(query.message).await {
                warn!(error = %e, "can't delete chat picker");
            }
            answer(ctx, query, "", false).await;
        }
        Err(e) => answer_error(ctx, query, &e).await,
    }
}
