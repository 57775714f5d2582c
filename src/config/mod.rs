//! Configuration management for the niftyalgo client
//!
//! Loads from YAML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{anyhow, bail, Context, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::client::ClientSettings;
use crate::types::Selection;

/// Env var consulted when `backend.ws_token` is not set
pub const WS_TOKEN_ENV: &str = "WS_AUTH_TOKEN";

/// Backend log endpoint rejects larger limits
const MAX_LOG_TAIL: u32 = 500;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub feed: FeedConfig,
    pub console: ConsoleConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (NIFTYALGO__FEED__POLL_INTERVAL_MS, ...)
            .add_source(Environment::with_prefix("NIFTYALGO").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            // Backend defaults
            .set_default("backend.base_url", "http://localhost:8001")?
            .set_default("backend.request_timeout_ms", 10_000)?
            // Feed defaults
            .set_default("feed.backoff_floor_ms", 3_000)?
            .set_default("feed.backoff_ceiling_ms", 30_000)?
            .set_default("feed.candle_history_limit", 200)?
            .set_default("feed.poll_interval_ms", 5_000)?
            .set_default("feed.log_tail_limit", 100)?
            .set_default("feed.default_index", "NIFTY")?
            .set_default("feed.default_interval_secs", 5)?
            // Console defaults
            .set_default("console.dashboard_interval_secs", 10)?
            // Logging defaults
            .set_default("logging.json", false)?)
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.feed.backoff_floor_ms == 0 {
            bail!("feed.backoff_floor_ms must be positive");
        }
        if self.feed.backoff_ceiling_ms < self.feed.backoff_floor_ms {
            bail!(
                "feed.backoff_ceiling_ms ({}) is below feed.backoff_floor_ms ({})",
                self.feed.backoff_ceiling_ms,
                self.feed.backoff_floor_ms
            );
        }
        if self.feed.candle_history_limit == 0 {
            bail!("feed.candle_history_limit must be positive");
        }
        if self.feed.poll_interval_ms == 0 {
            bail!("feed.poll_interval_ms must be positive");
        }
        if self.feed.log_tail_limit == 0 || self.feed.log_tail_limit > MAX_LOG_TAIL {
            bail!("feed.log_tail_limit must be within 1..={MAX_LOG_TAIL}");
        }
        if self.feed.default_interval_secs == 0 {
            bail!("feed.default_interval_secs must be positive");
        }
        if self.feed.default_index.trim().is_empty() {
            bail!("feed.default_index must not be empty");
        }
        self.ws_url()?;
        Ok(())
    }

    /// Feed auth token: config first, then `WS_AUTH_TOKEN`
    pub fn ws_token(&self) -> Option<String> {
        self.backend
            .ws_token
            .clone()
            .or_else(|| std::env::var(WS_TOKEN_ENV).ok())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Feed endpoint with the token attached as `?token=`.
    ///
    /// Without `backend.ws_url` it is derived from `backend.base_url`:
    /// `http://host:8001` becomes `ws://host:8001/ws`.
    pub fn ws_url(&self) -> Result<Url> {
        let mut url = match self.backend.ws_url.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                Url::parse(raw).with_context(|| format!("Invalid backend.ws_url: {raw}"))?
            }
            _ => derive_ws_url(&self.backend.base_url)?,
        };

        if let Some(token) = self.ws_token() {
            url.query_pairs_mut().append_pair("token", &token);
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.request_timeout_ms)
    }

    pub fn dashboard_interval(&self) -> Duration {
        Duration::from_secs(self.console.dashboard_interval_secs.max(1))
    }

    /// Runtime settings for [`crate::client::LiveClient`]
    pub fn client_settings(&self) -> Result<ClientSettings> {
        let mut settings = ClientSettings::new(self.ws_url()?);
        settings.backoff_floor = Duration::from_millis(self.feed.backoff_floor_ms);
        settings.backoff_ceiling = Duration::from_millis(self.feed.backoff_ceiling_ms);
        settings.poll_interval = Duration::from_millis(self.feed.poll_interval_ms);
        settings.candle_history_limit = self.feed.candle_history_limit;
        settings.log_tail_limit = self.feed.log_tail_limit;
        settings.initial_selection =
            Selection::new(&self.feed.default_index, self.feed.default_interval_secs);
        Ok(settings)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "backend={} token={} backoff={}..{}ms poll={}ms candles={} selection={}/{}s",
            self.backend.base_url,
            if self.ws_token().is_some() { "set" } else { "none" },
            self.feed.backoff_floor_ms,
            self.feed.backoff_ceiling_ms,
            self.feed.poll_interval_ms,
            self.feed.candle_history_limit,
            self.feed.default_index,
            self.feed.default_interval_secs
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

fn derive_ws_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url.trim())
        .with_context(|| format!("Invalid backend.base_url: {base_url}"))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => bail!("Unsupported backend.base_url scheme: {other}"),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("Cannot use {scheme} for {base_url}"))?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
