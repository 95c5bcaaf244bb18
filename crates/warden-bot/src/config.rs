//! Bot configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the bot can start with zero
//! configuration for local development.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use warden_shared::constants::{
    DEFAULT_ARABIC_THRESHOLD, DEFAULT_CHINESE_THRESHOLD, ENFORCEMENT_DEDUP_SECS,
    MIN_AUDIT_DELAY_MS, REFRESH_INTERVAL_SECS,
};
use warden_shared::UserId;
use warden_store::CategoryAssignments;

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// SQLite file backing the registry.
    /// Env: `DATABASE_PATH`
    /// Default: `./warden.db`
    pub database_path: PathBuf,

    /// Users with authority over every managed chat.
    /// Env: `GLOBAL_ADMINS` (comma-separated user ids)
    pub global_admins: HashSet<UserId>,

    /// JSON file assigning chats to directory categories.
    /// Env: `CATEGORIES_FILE`
    pub categories_file: Option<PathBuf>,

    /// Interval of the background metadata refresh.
    /// Env: `REFRESH_INTERVAL_SECS`
    /// Default: 600 s
    pub refresh_interval: Duration,

    /// Pause between per-chat platform calls in a privilege audit.
    /// Never below 500 ms.
    /// Env: `AUDIT_DELAY_MS`
    pub audit_delay: Duration,

    /// Share of Arabic characters above which the Arabic triggers match.
    /// Env: `ARABIC_THRESHOLD`
    pub arabic_threshold: f64,

    /// Share of Han characters above which the Chinese triggers match.
    /// Env: `CHINESE_THRESHOLD`
    pub chinese_threshold: f64,

    /// Window in which a second enforcement on the same member is skipped.
    /// Env: `ENFORCEMENT_DEDUP_SECS`
    pub dedup_window: Duration,

    /// Whether the CAS blacklist is consulted.
    /// Env: `CAS_ENABLED` (true/false)
    /// Default: `true`
    pub cas_enabled: bool,

    /// CAS check endpoint.
    /// Env: `CAS_URL`
    pub cas_url: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./warden.db"),
            global_admins: HashSet::new(),
            categories_file: None,
            refresh_interval: Duration::from_secs(REFRESH_INTERVAL_SECS),
            audit_delay: Duration::from_millis(MIN_AUDIT_DELAY_MS),
            arabic_threshold: DEFAULT_ARABIC_THRESHOLD,
            chinese_threshold: DEFAULT_CHINESE_THRESHOLD,
            dedup_window: Duration::from_secs(ENFORCEMENT_DEDUP_SECS),
            cas_enabled: true,
            cas_url: "https://api.cas.chat/check".to_string(),
        }
    }
}

impl BotConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BotConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(list) = var("GLOBAL_ADMINS") {
            config.global_admins = parse_user_list(&list);
        }

        if let Some(path) = var("CATEGORIES_FILE") {
            if !path.is_empty() {
                config.categories_file = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = var("REFRESH_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.refresh_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid REFRESH_INTERVAL_SECS, using default"),
            }
        }

        if let Some(val) = var("AUDIT_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.audit_delay = clamp_audit_delay(ms),
                Err(_) => tracing::warn!(value = %val, "Invalid AUDIT_DELAY_MS, using default"),
            }
        }

        if let Some(val) = var("ARABIC_THRESHOLD") {
            match parse_threshold(&val) {
                Some(t) => config.arabic_threshold = t,
                None => tracing::warn!(value = %val, "Invalid ARABIC_THRESHOLD, using default"),
            }
        }

        if let Some(val) = var("CHINESE_THRESHOLD") {
            match parse_threshold(&val) {
                Some(t) => config.chinese_threshold = t,
                None => tracing::warn!(value = %val, "Invalid CHINESE_THRESHOLD, using default"),
            }
        }

        if let Some(val) = var("ENFORCEMENT_DEDUP_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => config.dedup_window = Duration::from_secs(secs),
                Err(_) => tracing::warn!(value = %val, "Invalid ENFORCEMENT_DEDUP_SECS, using default"),
            }
        }

        if let Some(val) = var("CAS_ENABLED") {
            config.cas_enabled = val != "false" && val != "0";
        }

        if let Some(url) = var("CAS_URL") {
            if !url.is_empty() {
                config.cas_url = url;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    pub fn is_global_admin(&self, user: UserId) -> bool {
        self.global_admins.contains(&user)
    }

    /// Read the category file, or an empty assignment when none is configured.
    pub fn load_categories(&self) -> anyhow::Result<CategoryAssignments> {
        let Some(path) = &self.categories_file else {
            return Ok(CategoryAssignments::default());
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading category file {}", path.display()))?;
        CategoryAssignments::from_json_str(&json)
            .with_context(|| format!("parsing category file {}", path.display()))
    }
}

fn clamp_audit_delay(ms: u64) -> Duration {
    if ms < MIN_AUDIT_DELAY_MS {
        tracing::warn!(
            requested_ms = ms,
            min_ms = MIN_AUDIT_DELAY_MS,
            "AUDIT_DELAY_MS below platform limit, clamping"
        );
    }
    Duration::from_millis(ms.max(MIN_AUDIT_DELAY_MS))
}

fn parse_threshold(val: &str) -> Option<f64> {
    val.trim()
        .parse::<f64>()
        .ok()
        .filter(|t| (0.0..=1.0).contains(t))
}

fn parse_user_list(list: &str) -> HashSet<UserId> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<i64>() {
            Ok(id) => Some(UserId(id)),
            Err(_) => {
                tracing::warn!(value = %s, "Ignoring invalid id in GLOBAL_ADMINS");
                None
            }
        })
        .collect()
}
