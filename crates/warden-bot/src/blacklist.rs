//! External spammer blacklists.
//!
//! The only real implementation is the Combot Anti-Spam (CAS) service:
//! `GET <url>?user_id=<id>` answers `{"ok": true, ...}` for listed users.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use warden_shared::UserId;

#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("Blacklist request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Blacklist answered {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait Blacklist: Send + Sync {
    async fn is_listed(&self, user: UserId) -> Result<bool, BlacklistError>;
}

/// Blacklist that never matches. Used when CAS is disabled.
pub struct NoBlacklist;

#[async_trait]
impl Blacklist for NoBlacklist {
    async fn is_listed(&self, _user: UserId) -> Result<bool, BlacklistError> {
        Ok(false)
    }
}

#[derive(Debug, Deserialize)]
struct CasResponse {
    ok: bool,
}

pub struct CasBlacklist {
    client: reqwest::Client,
    url: String,
}

impl CasBlacklist {
    pub fn new(url: impl Into<String>) -> Result<Self, BlacklistError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn request_url(&self, user: UserId) -> String {
        format!("{}?user_id={}", self.url.trim_end_matches('/'), user.0)
    }
}

#[async_trait]
impl Blacklist for CasBlacklist {
    async fn is_listed(&self, user: UserId) -> Result<bool, BlacklistError> {
        let resp = self.client.get(self.request_url(user)).send().await?;
        if !resp.status().is_success() {
            return Err(BlacklistError::Status(resp.status()));
        }
        let body: CasResponse = resp.json().await?;
        Ok(body.ok)
    }
}
