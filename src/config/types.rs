//! Configuration sections

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Backend origin; REST lives under `/api`
    pub base_url: String,
    /// Explicit feed endpoint. Derived from `base_url` when unset.
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Feed auth token (falls back to `WS_AUTH_TOKEN`)
    #[serde(default)]
    pub ws_token: Option<String>,
    /// REST request timeout in milliseconds
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// First reconnect delay in milliseconds
    pub backoff_floor_ms: u64,
    /// Reconnect delay cap in milliseconds
    pub backoff_ceiling_ms: u64,
    /// Candles kept for charting
    pub candle_history_limit: usize,
    /// Polling fallback period in milliseconds
    pub poll_interval_ms: u64,
    /// Log rows fetched per refresh (backend caps at 500)
    pub log_tail_limit: u32,
    pub default_index: String,
    pub default_interval_secs: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Dashboard line interval in seconds
    pub dashboard_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human format
    pub json: bool,
}
