//! Slash commands.

use tracing::{debug, error, info, warn};
use warden_shared::constants::GENERIC_APOLOGY;
use warden_shared::{ChatId, InlineButton, MessageRef, OutgoingMessage, PlatformError, UserId};

use crate::audit;
use crate::callback::{CallbackData, HelpTarget};
use crate::context::{BotContext, Metrics};
use crate::control;
use crate::directory;
use crate::error::{BotError, Result};
use crate::update::IncomingMessage;

const HELP_TEXT: &str = "Hi! What are you looking for?";
const CANT_DM: &str =
    "Oops, I can't text you a direct message, start a direct conversation with me first!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Start,
    Groups,
    Settings,
    GroupsCheck,
    GroupsCheckNotify,
    Permissions,
    Reload,
    Terminate,
    Id,
}

impl Command {
    /// Split `/name[@bot] args` into a known command and its arguments.
    /// Commands addressed to another bot are not ours.
    pub fn parse<'a>(text: &'a str, bot_username: Option<&str>) -> Option<(Command, &'a str)> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let (name, target) = head.split_once('@').unwrap_or((head, ""));

        if !target.is_empty() && bot_username.is_some_and(|me| !me.eq_ignore_ascii_case(target)) {
            return None;
        }

        let command = match name.to_ascii_lowercase().as_str() {
            "help" => Command::Help,
            "start" => Command::Start,
            "groups" => Command::Groups,
            "settings" => Command::Settings,
            "groupscheck" => Command::GroupsCheck,
            "groupscheck_notify" => Command::GroupsCheckNotify,
            "permissions" => Command::Permissions,
            "reload" => Command::Reload,
            "terminate" => Command::Terminate,
            "id" => Command::Id,
            _ => return None,
        };
        Some((command, args.trim()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Start => "start",
            Command::Groups => "groups",
            Command::Settings => "settings",
            Command::GroupsCheck => "groupscheck",
            Command::GroupsCheckNotify => "groupscheck_notify",
            Command::Permissions => "permissions",
            Command::Reload => "reload",
            Command::Terminate => "terminate",
            Command::Id => "id",
        }
    }
}

async fn reply(ctx: &BotContext, chat: ChatId, message: OutgoingMessage) {
    if let Err(e) = ctx.platform.send_message(chat, message).await {
        warn!(chat = %chat, error = %e, "can't send reply");
    }
}

async fn delete_quietly(ctx: &BotContext, message: MessageRef) {
    if let Err(e) = ctx.platform.delete_message(message).await {
        debug!(chat = %message.chat, error = %e, "can't delete command message");
    }
}

fn private_chat(user: UserId) -> ChatId {
    ChatId(user.0)
}

/// Run a command. Failures are logged and answered with a generic text.
pub async fn handle(ctx: &BotContext, msg: &IncomingMessage) -> bool {
    let Some((command, args)) = Command::parse(&msg.text, ctx.me.username.as_deref()) else {
        return false;
    };
    Metrics::incr(&ctx.metrics.commands);
    debug!(command = command.name(), user = %msg.sender.id, chat = %msg.chat.id, "command received");

    let result = match command {
        Command::Help | Command::Start => on_help(ctx, msg, args).await,
        Command::Groups => on_groups(ctx, msg).await,
        Command::Settings => on_settings(ctx, msg).await,
        Command::GroupsCheck => on_groups_check(ctx, msg, false).await,
        Command::GroupsCheckNotify => on_groups_check(ctx, msg, true).await,
        Command::Permissions => on_permissions(ctx, msg).await,
        Command::Reload => on_reload(ctx, msg).await,
        Command::Terminate => on_terminate(ctx, msg).await,
        Command::Id => on_id(ctx, msg).await,
    };

    if let Err(e) = result {
        if e.is_internal() {
            error!(command = command.name(), chat = %msg.chat.id, user = %msg.sender.id, error = %e, "command failed");
        } else {
            warn!(command = command.name(), chat = %msg.chat.id, user = %msg.sender.id, error = %e, "command refused");
        }
        reply(ctx, msg.chat.id, OutgoingMessage::text(e.user_message())).await;
    }
    true
}

/// Help menu with the buttons the user can actually use.
pub async fn help_menu(ctx: &BotContext, user: UserId) -> Result<OutgoingMessage> {
    let mut keyboard = vec![vec![InlineButton::new(
        "Groups",
        CallbackData::Help(HelpTarget::Groups).to_string(),
    )]];

    let settings_visible = control::can_edit_any(ctx, user).await?;
    if settings_visible {
        keyboard.push(vec![InlineButton::new(
            "Settings",
            CallbackData::Help(HelpTarget::Settings).to_string(),
        )]);
    }
    keyboard.push(vec![InlineButton::new("Close", CallbackData::Close.to_string())]);

    Ok(OutgoingMessage::text(HELP_TEXT).with_keyboard(keyboard))
}

async fn on_help(ctx: &BotContext, msg: &IncomingMessage, args: &str) -> Result<()> {
    if !msg.is_private() {
        delete_quietly(ctx, msg.message).await;
        return Ok(());
    }

    if !args.is_empty() {
        return start_from_deep_link(ctx, msg, args).await;
    }

    let menu = help_menu(ctx, msg.sender.id).await?;
    reply(ctx, msg.chat.id, menu).await;
    Ok(())
}

/// `/start <token>`: reply with a fresh invite link of the linked chat.
/// Unknown or malformed tokens get the generic apology.
async fn start_from_deep_link(ctx: &BotContext, msg: &IncomingMessage, token: &str) -> Result<()> {
    let text = match resolve_deep_link(ctx, token).await {
        Ok(link) => format!(
            "Hi! The invite link is the following (if it says it's invalid, wait 1-2 minutes before using it):\n\n{link}"
        ),
        Err(e) => {
            warn!(user = %msg.sender.id, token = %token, error = %e, "can't resolve deep link");
            GENERIC_APOLOGY.to_string()
        }
    };
    reply(ctx, msg.chat.id, OutgoingMessage::text(text)).await;
    Ok(())
}

async fn resolve_deep_link(ctx: &BotContext, token: &str) -> Result<String> {
    let chat = ctx.registry.resolve_deep_link(token).await?;
    let (link, _) = ctx
        .registry
        .invite_link_for(ctx.platform.as_ref(), chat)
        .await?;
    Ok(link)
}

async fn on_groups(ctx: &BotContext, msg: &IncomingMessage) -> Result<()> {
    let menu = directory::groups_menu(ctx).await?;
    match ctx
        .platform
        .send_message(private_chat(msg.sender.id), menu)
        .await
    {
        Ok(_) => {
            if !msg.is_private() {
                delete_quietly(ctx, msg.message).await;
            }
            Ok(())
        }
        Err(PlatformError::Forbidden(reason)) => {
            debug!(user = %msg.sender.id, reason = %reason, "user has not started a private chat");
            reply(ctx, msg.chat.id, OutgoingMessage::text(CANT_DM)).await;
            Ok(())
        }
        Err(e) => Err(BotError::platform(msg.chat.id, e)),
    }
}

async fn on_settings(ctx: &BotContext, msg: &IncomingMessage) -> Result<()> {
    if msg.is_private() {
        let picker = control::settings_picker(ctx, msg.sender.id).await?;
        reply(ctx, msg.chat.id, picker).await;
        return Ok(());
    }
    ctx.settings_for(&msg.chat).await?;
    control::send_settings(ctx, msg.chat.id, msg.sender.id, msg.chat.id).await?;
    Ok(())
}

fn require_global_admin(ctx: &BotContext, msg: &IncomingMessage) -> Result<()> {
    if ctx.is_global_admin(msg.sender.id) {
        Ok(())
    } else {
        Err(BotError::Unauthorized { chat: msg.chat.id })
    }
}

async fn on_groups_check(ctx: &BotContext, msg: &IncomingMessage, notify: bool) -> Result<()> {
    require_global_admin(ctx, msg)?;
    info!(user = %msg.sender.id, notify, "global privilege audit requested");
    audit::audit_all(ctx, msg.chat.id, notify).await?;
    Ok(())
}

/// Chat-scoped command guard: group chats only, chat admins only.
async fn require_chat_admin(ctx: &BotContext, msg: &IncomingMessage) -> Result<bool> {
    if msg.is_private() {
        reply(ctx, msg.chat.id, OutgoingMessage::text("This command works in groups only.")).await;
        return Ok(false);
    }
    ctx.settings_for(&msg.chat).await?;
    ctx.authorize(msg.sender.id, msg.chat.id).await?;
    Ok(true)
}

async fn on_permissions(ctx: &BotContext, msg: &IncomingMessage) -> Result<()> {
    if !require_chat_admin(ctx, msg).await? {
        return Ok(());
    }
    let (_, text) = audit::audit_chat(ctx, &msg.chat).await;
    reply(ctx, msg.chat.id, OutgoingMessage::text(text)).await;
    Ok(())
}

async fn on_reload(ctx: &BotContext, msg: &IncomingMessage) -> Result<()> {
    if msg.is_private() {
        reply(ctx, msg.chat.id, OutgoingMessage::text("This command works in groups only.")).await;
        return Ok(());
    }
    ctx.settings_for(&msg.chat).await?;
    // The sender may have just been promoted, so authorize against fresh data.
    let settings = ctx.authorize_live(msg.sender.id, msg.chat.id).await?;

    if let Ok(live) = ctx.platform.get_chat(msg.chat.id).await {
        if let Some(stored) = ctx.registry.get(msg.chat.id).await? {
            ctx.registry.upsert(&stored.refreshed_from(&live)).await?;
        }
    }

    reply(
        ctx,
        msg.chat.id,
        OutgoingMessage::text(format!(
            "Reloaded: {} administrators known",
            settings.chat_admins.len()
        )),
    )
    .await;
    Ok(())
}

async fn on_terminate(ctx: &BotContext, msg: &IncomingMessage) -> Result<()> {
    if !require_chat_admin(ctx, msg).await? {
        return Ok(());
    }
    info!(chat = %msg.chat.id, user = %msg.sender.id, "management terminated by admin");
    ctx.registry.delete(msg.chat.id).await?;
    ctx.platform
        .leave_chat(msg.chat.id)
        .await
        .map_err(|e| BotError::platform(msg.chat.id, e))
}

async fn on_id(ctx: &BotContext, msg: &IncomingMessage) -> Result<()> {
    let text = format!(
        "Your ID is: {}\nThis chat ID is: {}",
        msg.sender.id, msg.chat.id
    );
    reply(ctx, msg.chat.id, OutgoingMessage::text(text)).await;
    Ok(())
}
