//! Feed wire protocol
//!
//! Inbound frames are JSON objects `{"type": ..., "data": {...}}`.
//! Outbound frames are tagged the same way, e.g.
//! `{"type": "subscribe", "index": "NIFTY", "interval": 5}`.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::types::{Candle, MarketStatus, TradingMode};

/// Messages pushed by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Tick(TickData),
    Candle(CandleData),
    StateUpdate(StateSnapshot),
    DailyStopTriggered(DailyStopData),
    TradeClosed,
    Heartbeat,
    Ack(AckData),
    /// Server-side rejection, e.g. a bad auth token
    Error(String),
}

impl ServerMessage {
    /// Decode a text frame.
    ///
    /// Returns `Ok(None)` for frames without a `type` or with a type this
    /// client does not handle; those are ignored, not errors.
    pub fn parse(text: &str) -> Result<Option<Self>, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;

        let Some(kind) = value.get("type").and_then(|v| v.as_str()) else {
            return Ok(None);
        };

        let data = || value.get("data").cloned().unwrap_or(Value::Null);

        let message = match kind {
            "tick" => ServerMessage::Tick(serde_json::from_value(data())?),
            "candle" => ServerMessage::Candle(serde_json::from_value(data())?),
            "state_update" => ServerMessage::StateUpdate(serde_json::from_value(data())?),
            "daily_stop_triggered" => {
                let payload = match data() {
                    Value::Null => DailyStopData::default(),
                    other => serde_json::from_value(other)?,
                };
                ServerMessage::DailyStopTriggered(payload)
            }
            "trade_closed" => ServerMessage::TradeClosed,
            "heartbeat" => ServerMessage::Heartbeat,
            "ack" => ServerMessage::Ack(serde_json::from_value(value.clone())?),
            "error" => ServerMessage::Error(
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unspecified error")
                    .to_string(),
            ),
            other => {
                debug!(kind = other, "Ignoring unknown feed message type");
                return Ok(None);
            }
        };

        Ok(Some(message))
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Tick(_) => "tick",
            ServerMessage::Candle(_) => "candle",
            ServerMessage::StateUpdate(_) => "state_update",
            ServerMessage::DailyStopTriggered(_) => "daily_stop_triggered",
            ServerMessage::TradeClosed => "trade_closed",
            ServerMessage::Heartbeat => "heartbeat",
            ServerMessage::Ack(_) => "ack",
            ServerMessage::Error(_) => "error",
        }
    }
}

/// `tick` payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickData {
    #[serde(alias = "last_traded_price", alias = "index_ltp")]
    pub ltp: f64,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub ts: Option<f64>,
}

/// `candle` payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CandleData {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, alias = "timestamp")]
    pub ts: Option<f64>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub interval: Option<u32>,
}

impl CandleData {
    /// Bar without routing metadata; missing timestamps default to now
    pub fn to_candle(&self) -> Candle {
        Candle {
            timestamp: self
                .ts
                .map(|ts| ts as i64)
                .unwrap_or_else(|| Utc::now().timestamp()),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
        }
    }
}

/// Position slice of a state snapshot (also the `GET /api/position` body)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PositionSnapshot {
    #[serde(deserialize_with = "lenient")]
    pub has_position: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub option_type: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub strike: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub expiry: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub index_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub entry_price: Option<f64>,
    #[serde(deserialize_with = "lenient", alias = "current_price")]
    pub current_ltp: Option<f64>,
    #[serde(deserialize_with = "lenient", alias = "quantity")]
    pub qty: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub trailing_sl: Option<f64>,
}

impl PositionSnapshot {
    /// Explicit `has_position: false` marks a flat book
    pub fn is_flat(&self) -> bool {
        self.has_position == Some(false)
    }
}

/// `state_update` payload. Every field is optional; see
/// [`ViewState::merge_snapshot`](crate::store::ViewState::merge_snapshot).
///
/// Fields are decoded one by one: a value of the wrong shape is dropped
/// as if absent and the rest of the snapshot still applies.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StateSnapshot {
    // bot status
    #[serde(deserialize_with = "lenient")]
    pub is_running: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub mode: Option<TradingMode>,
    #[serde(deserialize_with = "lenient")]
    pub market_status: Option<MarketStatus>,
    #[serde(deserialize_with = "lenient")]
    pub trading_enabled: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub selected_index: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub candle_interval: Option<u32>,
    #[serde(deserialize_with = "lenient")]
    pub daily_max_loss_triggered: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub connection_status: Option<String>,

    // market
    #[serde(deserialize_with = "lenient")]
    pub index_ltp: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub signal_status: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub htf_signal_status: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub supertrend_value: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub macd_value: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub adx_value: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub mds_score: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub mds_slope: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub mds_acceleration: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub mds_stability: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub mds_confidence: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub mds_is_choppy: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub mds_direction: Option<String>,

    // position
    #[serde(deserialize_with = "lenient")]
    pub position: Option<PositionSnapshot>,
    #[serde(deserialize_with = "lenient")]
    pub entry_price: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub current_option_ltp: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub trailing_sl: Option<f64>,

    // daily summary
    #[serde(deserialize_with = "lenient")]
    pub daily_trades: Option<u32>,
    #[serde(deserialize_with = "lenient")]
    pub daily_pnl: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub max_drawdown: Option<f64>,
}

/// Field types that decode from any JSON value, yielding `None` for
/// values of the wrong shape instead of failing the whole frame
trait Lenient: Sized {
    fn from_json(value: Value) -> Option<Self>;
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Lenient,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    let shown = value.to_string();
    let decoded = T::from_json(value);
    if decoded.is_none() {
        debug!(value = %shown, "Dropping malformed snapshot field");
    }
    Ok(decoded)
}

impl Lenient for f64 {
    fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

impl Lenient for i64 {
    fn from_json(value: Value) -> Option<Self> {
        let number = f64::from_json(value)?;
        (number.fract() == 0.0 && number.abs() <= i64::MAX as f64).then_some(number as i64)
    }
}

impl Lenient for u32 {
    fn from_json(value: Value) -> Option<Self> {
        i64::from_json(value).and_then(|n| u32::try_from(n).ok())
    }
}

impl Lenient for bool {
    fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Lenient for String {
    fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl Lenient for TradingMode {
    fn from_json(value: Value) -> Option<Self> {
        value.as_str().and_then(TradingMode::from_str)
    }
}

impl Lenient for MarketStatus {
    fn from_json(value: Value) -> Option<Self> {
        value.as_str().and_then(MarketStatus::from_str)
    }
}

impl Lenient for PositionSnapshot {
    fn from_json(value: Value) -> Option<Self> {
        value
            .is_object()
            .then(|| serde_json::from_value(value).ok())
            .flatten()
    }
}

/// `daily_stop_triggered` payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DailyStopData {
    pub message: Option<String>,
    pub daily_pnl: Option<f64>,
    pub daily_max_loss: Option<f64>,
}

impl DailyStopData {
    pub fn alert_text(&self) -> String {
        match (&self.message, self.daily_max_loss) {
            (Some(message), _) if !message.trim().is_empty() => message.clone(),
            (_, Some(limit)) => format!(
                "Daily max loss of {limit:.0} reached. Bot will not take new trades today."
            ),
            _ => "Daily stop triggered. Bot will not take new trades today.".to_string(),
        }
    }
}

/// Subscription acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AckData {
    pub status: Option<String>,
    pub index: Option<String>,
    pub interval: Option<u32>,
}

/// Messages sent to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { index: String, interval: u32 },
}

impl ClientMessage {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
