//! Core types used throughout the client
//!
//! View-state slices mirrored from the backend: bot status, position,
//! daily summary, market tick, candles, trades and the cached config.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flat mapping of named trading/risk parameters as served by `GET /api/config`
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// State of the live WebSocket feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Order execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Simulated fills
    #[default]
    Paper,
    /// Real orders at the broker
    Live,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "paper" => Some(TradingMode::Paper),
            "live" => Some(TradingMode::Live),
            _ => None,
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exchange session state as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Open,
    #[default]
    Closed,
}

impl MarketStatus {
    /// Case-insensitive; anything but open/closed is unknown
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(MarketStatus::Open),
            "closed" => Some(MarketStatus::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStatus::Open => write!(f, "open"),
            MarketStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Signal telemetry computed by the backend (MDS score engine, SuperTrend, MACD, ADX)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalMetrics {
    pub signal_status: Option<String>,
    pub htf_signal_status: Option<String>,
    pub supertrend_value: Option<f64>,
    pub macd_value: Option<f64>,
    pub adx_value: Option<f64>,
    pub mds_score: Option<f64>,
    pub mds_slope: Option<f64>,
    pub mds_acceleration: Option<f64>,
    pub mds_stability: Option<f64>,
    pub mds_confidence: Option<f64>,
    pub mds_is_choppy: Option<bool>,
    pub mds_direction: Option<String>,
}

/// Latest market tick of the selected index. Never historized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    /// Last traded price of the underlying
    pub ltp: f64,
    pub index: Option<String>,
    pub scores: SignalMetrics,
    pub updated_at: Option<DateTime<Utc>>,
}

/// OHLC bar used for charting only
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar time, unix seconds
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Bot status slice; merged field by field on every state-sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotStatus {
    pub is_running: bool,
    pub mode: TradingMode,
    pub market_status: MarketStatus,
    pub trading_enabled: bool,
    pub selected_index: String,
    /// Candle interval in seconds
    pub candle_interval: u32,
    pub daily_max_loss_triggered: bool,
    /// Broker connectivity as seen by the backend
    pub connection_status: Option<String>,
}

impl Default for BotStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            mode: TradingMode::Paper,
            market_status: MarketStatus::Closed,
            trading_enabled: true,
            selected_index: "NIFTY".to_string(),
            candle_interval: 5,
            daily_max_loss_triggered: false,
            connection_status: None,
        }
    }
}

/// Open option position. `None` in the view-state means flat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub option_type: Option<String>,
    pub strike: Option<i64>,
    pub expiry: Option<String>,
    pub index_name: Option<String>,
    pub entry_price: f64,
    pub current_price: f64,
    pub quantity: f64,
    /// Display estimate; recomputed locally on every state-sync
    pub unrealized_pnl: f64,
    pub trailing_sl: Option<f64>,
}

impl Position {
    /// `(current - entry) * quantity`
    pub fn estimate_pnl(entry_price: f64, current_price: f64, quantity: f64) -> f64 {
        (current_price - entry_price) * quantity
    }
}

/// Cumulative figures for the trading day, reset by the backend at rollover
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailySummary {
    pub total_trades: u32,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub daily_stop_triggered: bool,
}

/// Trade-history row from `GET /api/trades`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trade {
    pub trade_id: String,
    pub entry_time: String,
    pub exit_time: Option<String>,
    pub option_type: String,
    pub strike: i64,
    pub expiry: String,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub exit_reason: Option<String>,
    pub index_name: Option<String>,
}

/// Count, P&L and win rate of one group of closed trades
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupStats {
    pub count: u32,
    pub pnl: f64,
    /// Percent
    pub win_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DayStats {
    pub trades: u32,
    pub pnl: f64,
    pub wins: u32,
}

/// All-time statistics over closed trades, from `GET /api/analytics`.
///
/// Computed by the backend; the client only displays it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeAnalytics {
    pub total_trades: u32,
    pub total_pnl: f64,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// Percent
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub avg_trade_pnl: f64,
    pub std_dev: f64,
    pub sharpe_ratio: f64,
    pub max_consecutive_wins: u32,
    pub max_consecutive_losses: u32,
    pub max_drawdown: f64,
    pub avg_drawdown: f64,
    pub trading_days: u32,
    pub avg_trades_per_day: f64,
    /// Keyed by option type (CE/PE)
    pub trades_by_type: BTreeMap<String, GroupStats>,
    pub trades_by_index: BTreeMap<String, GroupStats>,
    pub trades_by_exit_reason: BTreeMap<String, GroupStats>,
    /// Keyed by entry date, `YYYY-MM-DD`
    pub daily_stats: BTreeMap<String, DayStats>,
}

/// Log tail row from `GET /api/logs`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub tag: Option<String>,
}

/// Tradable index metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexInfo {
    pub name: String,
    pub display_name: String,
    pub lot_size: u32,
    pub strike_interval: u32,
    pub expiry_type: Option<String>,
    pub expiry_day: Option<u8>,
}

/// Selectable candle interval
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeInfo {
    /// Seconds
    pub value: u32,
    pub label: String,
}

/// Instrument and candle interval the feed is subscribed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub index: String,
    pub interval_secs: u32,
}

impl Selection {
    pub fn new(index: impl Into<String>, interval_secs: u32) -> Self {
        Self {
            index: index.into().trim().to_uppercase(),
            interval_secs,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.index, self.interval_secs)
    }
}
