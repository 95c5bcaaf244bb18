/// Application name
pub const APP_NAME: &str = "Warden";

/// Store table holding one serialized `ChatRecord` per chat
pub const TABLE_CHATROOMS: &str = "chatrooms";

/// Store table holding one serialized `PolicySettings` per chat
pub const TABLE_SETTINGS: &str = "settings";

/// Store table mapping a chat to its public deep-link UUID
pub const TABLE_PUBLIC_LINKS: &str = "public-links";

/// Interval of the background chat metadata refresh, in seconds
pub const REFRESH_INTERVAL_SECS: u64 = 600;

/// Minimum pause between per-chat platform calls during a privilege audit
pub const MIN_AUDIT_DELAY_MS: u64 = 500;

/// Default script-ratio thresholds above which a classifier matches
pub const DEFAULT_ARABIC_THRESHOLD: f64 = 0.1;
pub const DEFAULT_CHINESE_THRESHOLD: f64 = 0.1;

/// Window in which repeated enforcement on the same (chat, user) is suppressed
pub const ENFORCEMENT_DEDUP_SECS: u64 = 30;

/// Page size used when scanning a store table
pub const SCAN_PAGE_SIZE: usize = 100;

/// Maximum concurrent per-chat platform calls in the background refresh
pub const REFRESH_CONCURRENCY: usize = 4;

/// Generic reply shown whenever something went wrong internally
pub const GENERIC_APOLOGY: &str = "Oops, something went wrong. Please try again later.";
