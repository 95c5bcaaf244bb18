//! Suppression of repeated enforcement against the same member.
//!
//! The platform may deliver the same join twice, and a spammer usually
//! posts a burst of messages. The guard admits one kick or ban per
//! `(chat, user)` inside a sliding window. Message deletion is not gated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use warden_shared::{ChatId, UserId};

#[derive(Clone)]
pub struct EnforcementGuard {
    recent: Arc<Mutex<HashMap<(ChatId, UserId), Instant>>>,
    window: Duration,
}

impl EnforcementGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            recent: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    /// Claim the right to enforce against `user` in `chat`.
    ///
    /// Returns `false` when an enforcement was already claimed within the
    /// window.
    pub async fn try_claim(&self, chat: ChatId, user: UserId) -> bool {
        let mut recent = self.recent.lock().await;
        let now = Instant::now();
        match recent.get(&(chat, user)) {
            Some(at) if now.duration_since(*at) < self.window => false,
            _ => {
                recent.insert((chat, user), now);
                true
            }
        }
    }

    /// Give back a claim whose enforcement did not go through.
    pub async fn release(&self, chat: ChatId, user: UserId) {
        self.recent.lock().await.remove(&(chat, user));
    }

    /// Drop claims older than the window.
    pub async fn purge_stale(&self) {
        let mut recent = self.recent.lock().await;
        let now = Instant::now();
        recent.retain(|_, at| now.duration_since(*at) < self.window);
    }

    pub async fn len(&self) -> usize {
        self.recent.lock().await.len()
    }
}

impl Default for EnforcementGuard {
    fn default() -> Self {
        Self::new(Duration::from_secs(
            warden_shared::constants::ENFORCEMENT_DEDUP_SECS,
        ))
    }
}
