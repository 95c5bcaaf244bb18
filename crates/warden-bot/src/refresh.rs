//! Periodic refresh of cached chat metadata.
//!
//! Runs beside the update handlers and never blocks them. Chats are
//! refreshed concurrently with a small fan-out.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_shared::constants::REFRESH_CONCURRENCY;
use warden_shared::{ChatRecord, PlatformError};

use crate::context::BotContext;
use crate::error::Result;
use crate::guard::EnforcementGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatRefresh {
    Updated,
    Migrated,
    Removed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub updated: usize,
    pub migrated: usize,
    pub removed: usize,
    pub failed: usize,
}

async fn refresh_chat(ctx: &BotContext, record: ChatRecord) -> Result<ChatRefresh> {
    let outcome = match ctx.platform.get_chat(record.id).await {
        Ok(live) => {
            ctx.registry.upsert(&record.refreshed_from(&live)).await?;
            ctx.refresh_admins(record.id).await?;
            ChatRefresh::Updated
        }
        Err(PlatformError::Migrated { new_chat }) => {
            let live = ctx.platform.get_chat(new_chat).await?;
            let migrated = ChatRecord {
                invite_link: None,
                hidden: record.hidden,
                ..live
            };
            info!(old = %record.id, new = %new_chat, "chat migrated, remapping");
            ctx.registry.remap(record.id, &migrated).await?;
            ctx.refresh_admins(new_chat).await?;
            ChatRefresh::Migrated
        }
        Err(e) if e.is_gone() => {
            info!(chat = %record.id, error = %e, "chat no longer reachable, removing");
            ctx.registry.delete(record.id).await?;
            ChatRefresh::Removed
        }
        Err(e) => return Err(e.into()),
    };
    Ok(outcome)
}

/// Refresh every registered chat once.
pub async fn refresh_all(ctx: &BotContext) -> Result<RefreshSummary> {
    let chats = ctx.registry.list().await?;
    debug!(chats = chats.len(), "refreshing chat metadata");

    let results: Vec<ChatRefresh> = stream::iter(chats)
        .map(|record| async move {
            let id = record.id;
            match refresh_chat(ctx, record).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(chat = %id, error = %e, "chat refresh failed");
                    ChatRefresh::Failed
                }
            }
        })
        .buffer_unordered(REFRESH_CONCURRENCY)
        .collect()
        .await;

    let mut summary = RefreshSummary::default();
    for result in results {
        match result {
            ChatRefresh::Updated => summary.updated += 1,
            ChatRefresh::Migrated => summary.migrated += 1,
            ChatRefresh::Removed => summary.removed += 1,
            ChatRefresh::Failed => summary.failed += 1,
        }
    }
    Ok(summary)
}

/// Refresh on a fixed interval, first run one interval after start.
pub fn spawn_refresh_loop(ctx: Arc<BotContext>) -> JoinHandle<()> {
    let period = ctx.config.refresh_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let started = tokio::time::Instant::now();
            match refresh_all(&ctx).await {
                Ok(summary) => info!(
                    ?summary,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "chat refresh finished"
                ),
                Err(e) => error!(error = %e, "chat refresh cycle failed"),
            }
        }
    })
}

/// Periodically drop expired enforcement claims.
pub fn spawn_guard_purge(guard: EnforcementGuard, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            guard.purge_stale().await;
        }
    })
}
