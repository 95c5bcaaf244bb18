//! Privilege audit: does the bot hold the admin rights it needs?
//!
//! Chats are checked one at a time against live platform data with a fixed
//! pause between chats. The platform throttles or drops bots that query
//! membership in bursts.

use std::fmt::Write as _;

use tracing::{debug, info, warn};
use warden_shared::{
    ChatId, ChatMember, ChatRecord, MessageRef, OutgoingMessage, Right, REQUIRED_RIGHTS,
};

use crate::context::BotContext;
use crate::error::{BotError, Result};

const NOT_ADMIN_NOTICE: &str = "Oops, I am not an administrator here, so moderation is not \
     working!\n\nGroup admins: write /settings to me in private to see which rights are missing.";
const DEGRADED_NOTICE: &str = "Oops, I am missing some administrator rights, so moderation \
     may not work!\n\nGroup admins: write /permissions here to see which ones.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivilegeStatus {
    /// Administrator with every required right.
    Ok,
    /// Not an administrator at all: nothing can be enforced.
    NotAdmin,
    /// Administrator lacking the listed rights.
    Degraded(Vec<Right>),
    /// The chat could not be queried.
    Unreachable,
}

impl PrivilegeStatus {
    pub fn of(member: &ChatMember) -> Self {
        if !member.is_admin() {
            return PrivilegeStatus::NotAdmin;
        }
        let missing = member.missing_rights();
        if missing.is_empty() {
            PrivilegeStatus::Ok
        } else {
            PrivilegeStatus::Degraded(missing)
        }
    }

    pub fn needs_attention(&self) -> bool {
        matches!(self, PrivilegeStatus::NotAdmin | PrivilegeStatus::Degraded(_))
    }

    fn summary(&self) -> String {
        match self {
            PrivilegeStatus::Ok => "✅".to_string(),
            PrivilegeStatus::NotAdmin => "❌ not admin".to_string(),
            PrivilegeStatus::Degraded(missing) => {
                let tags: String = missing.iter().map(|r| r.tag()).collect();
                format!("{tags}❌")
            }
            PrivilegeStatus::Unreachable => "⚠️ unreachable".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub chat: ChatId,
    pub title: String,
    pub status: PrivilegeStatus,
}

#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub entries: Vec<AuditEntry>,
}

impl AuditReport {
    pub fn status_of(&self, chat: ChatId) -> Option<&PrivilegeStatus> {
        self.entries
            .iter()
            .find(|e| e.chat == chat)
            .map(|e| &e.status)
    }
}

/// Tag legend printed at the top of every report.
fn legend() -> String {
    let mut out = String::new();
    for spec in REQUIRED_RIGHTS {
        let _ = writeln!(out, "{} -> {}", spec.tag, spec.description);
    }
    out.push('\n');
    out
}

/// Live status of the bot in one chat. The title comes from the platform
/// when the chat answers.
async fn check(ctx: &BotContext, record: &ChatRecord) -> AuditEntry {
    let live = match ctx.platform.get_chat(record.id).await {
        Ok(live) => live,
        Err(e) => {
            warn!(chat = %record.id, error = %e, "can't refresh chat for audit");
            return AuditEntry {
                chat: record.id,
                title: record.title.clone(),
                status: PrivilegeStatus::Unreachable,
            };
        }
    };

    let status = match ctx.platform.get_chat_member(live.id, ctx.me.id).await {
        Ok(member) => PrivilegeStatus::of(&member),
        Err(e) => {
            warn!(chat = %live.id, error = %e, "can't read own membership");
            PrivilegeStatus::Unreachable
        }
    };

    AuditEntry {
        chat: live.id,
        title: live.title,
        status,
    }
}

async fn edit_progress(ctx: &BotContext, status: MessageRef, text: &str) {
    if let Err(e) = ctx
        .platform
        .edit_message(status, OutgoingMessage::text(text))
        .await
    {
        warn!(chat = %status.chat, error = %e, "can't update audit progress");
    }
}

/// Audit every registered chat, streaming progress into one message in
/// `report_to`. With `notify`, chats needing attention get a warning.
pub async fn audit_all(ctx: &BotContext, report_to: ChatId, notify: bool) -> Result<AuditReport> {
    info!(report_to = %report_to, notify, "privilege audit started");

    let status = ctx
        .platform
        .send_message(report_to, OutgoingMessage::text("Work in progress..."))
        .await
        .map_err(|e| BotError::platform(report_to, e))?;

    let mut chats = ctx.registry.list().await?;
    chats.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

    let mut text = legend();
    let mut report = AuditReport::default();

    for (i, record) in chats.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(ctx.config.audit_delay).await;
        }

        let entry = check(ctx, record).await;
        debug!(chat = %entry.chat, status = ?entry.status, "audited chat");

        if notify && entry.status.needs_attention() {
            let notice = match entry.status {
                PrivilegeStatus::NotAdmin => NOT_ADMIN_NOTICE,
                _ => DEGRADED_NOTICE,
            };
            if let Err(e) = ctx
                .platform
                .send_message(entry.chat, OutgoingMessage::text(notice))
                .await
            {
                warn!(chat = %entry.chat, error = %e, "can't notify chat about missing rights");
            }
        }

        let _ = writeln!(text, " - {} : {}", entry.title, entry.status.summary());
        edit_progress(ctx, status, &text).await;
        report.entries.push(entry);
    }

    text.push_str("\ndone");
    edit_progress(ctx, status, &text).await;

    info!(chats = report.entries.len(), "privilege audit finished");
    Ok(report)
}

/// Audit a single chat and describe the result in plain text.
pub async fn audit_chat(ctx: &BotContext, record: &ChatRecord) -> (AuditEntry, String) {
    let entry = check(ctx, record).await;

    let mut text = format!("Bot permissions in {}:\n\n", entry.title);
    match &entry.status {
        PrivilegeStatus::Ok => text.push_str("✅ All required rights granted"),
        PrivilegeStatus::NotAdmin => {
            text.push_str("❌ I am not an administrator here, nothing can be enforced")
        }
        PrivilegeStatus::Degraded(missing) => {
            text.push_str("Missing rights:\n");
            for right in missing {
                let _ = writeln!(text, " - {}", right.spec().description);
            }
        }
        PrivilegeStatus::Unreachable => text.push_str("⚠️ Can't read my permissions right now"),
    }
    (entry, text)
}
