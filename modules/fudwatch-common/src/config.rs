use std::env;

use tracing::info;

/// Which change-detection strategy the sentinel runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStrategy {
    /// Reply-count diffing only. O(changed posts) per cycle.
    Incremental,
    /// Bounded-depth walk of every reply tree each cycle, with a seen-set.
    FullScan,
}

impl ScanStrategy {
    /// Parse the `SCAN_STRATEGY` env value. Unknown values are a startup
    /// misconfiguration and therefore fatal.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "incremental" => ScanStrategy::Incremental,
            "full" | "full_scan" | "fullscan" => ScanStrategy::FullScan,
            other => panic!("SCAN_STRATEGY must be 'incremental' or 'full', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Feed platform
    pub feed_api_base: String,
    pub feed_api_key: String,
    pub community_id: String,

    // Classification service
    pub anthropic_api_key: String,
    pub stage1_model: String,
    pub stage2_model: String,

    // Operator notifications
    pub courier_api_base: String,
    pub courier_token: String,
    /// Chat ids that receive broadcast alerts.
    pub courier_recipients: Vec<String>,

    // Watch targets
    pub ticker: String,
    pub bot_handle: String,

    // Polling and queues
    pub poll_interval_secs: u64,
    pub queue_capacity: usize,
    pub scan_strategy: ScanStrategy,
    pub full_scan_max_depth: u32,
    pub seen_set_cap: usize,
    /// Page cap for the user-history backfill search.
    pub history_page_cap: u32,
    pub cache_ttl_hours: i64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            feed_api_base: required_env("FEED_API_BASE"),
            feed_api_key: required_env("FEED_API_KEY"),
            community_id: required_env("COMMUNITY_ID"),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            stage1_model: env_or("STAGE1_MODEL", "claude-haiku-4-5-20251001"),
            stage2_model: env_or("STAGE2_MODEL", "claude-sonnet-4-5-20250929"),
            courier_api_base: required_env("COURIER_API_BASE"),
            courier_token: required_env("COURIER_TOKEN"),
            courier_recipients: env_or("COURIER_RECIPIENTS", "")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            ticker: required_env("TICKER"),
            bot_handle: required_env("BOT_HANDLE"),
            poll_interval_secs: parsed_env("POLL_INTERVAL_SECS", 30),
            queue_capacity: parsed_env("QUEUE_CAPACITY", 64),
            scan_strategy: ScanStrategy::parse(&env_or("SCAN_STRATEGY", "incremental")),
            full_scan_max_depth: parsed_env("FULL_SCAN_MAX_DEPTH", 10),
            seen_set_cap: parsed_env("SEEN_SET_CAP", 50_000),
            history_page_cap: parsed_env("HISTORY_PAGE_CAP", 5),
            cache_ttl_hours: parsed_env("CACHE_TTL_HOURS", 24),
        }
    }

    /// Log the non-secret parts of the configuration at startup.
    pub fn log_redacted(&self) {
        info!(
            feed_api_base = self.feed_api_base.as_str(),
            community_id = self.community_id.as_str(),
            ticker = self.ticker.as_str(),
            bot_handle = self.bot_handle.as_str(),
            poll_interval_secs = self.poll_interval_secs,
            queue_capacity = self.queue_capacity,
            scan_strategy = ?self.scan_strategy,
            cache_ttl_hours = self.cache_ttl_hours,
            recipients = self.courier_recipients.len(),
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got '{raw}'")),
        Err(_) => default,
    }
}
