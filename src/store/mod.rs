//! View-state container
//!
//! `ViewState` is the reducer: every backend push and every REST result is
//! folded into it through the methods below. `Store` wraps it for sharing
//! between the feed supervisor, the poller and the command functions.

mod candles;
mod selection;

pub use candles::CandleHistory;
pub use selection::SelectionCell;

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::api::StrategySummary;
use crate::feed::protocol::{CandleData, DailyStopData, PositionSnapshot, StateSnapshot, TickData};
use crate::types::{
    BotStatus, ConfigMap, ConnectionState, DailySummary, IndexInfo, LogEntry, MarketTick,
    Position, Selection, TimeframeInfo, Trade, TradeAnalytics,
};

/// Everything the dashboard renders
#[derive(Debug, Clone)]
pub struct ViewState {
    pub connection: ConnectionState,
    pub market: MarketTick,
    pub candles: CandleHistory,
    pub status: BotStatus,
    /// `None` means flat
    pub position: Option<Position>,
    pub summary: DailySummary,
    pub trades: Vec<Trade>,
    pub analytics: TradeAnalytics,
    pub logs: Vec<LogEntry>,
    pub config: ConfigMap,
    pub indices: Vec<IndexInfo>,
    pub timeframes: Vec<TimeframeInfo>,
    pub strategies: Vec<StrategySummary>,
    /// Last daily-stop alert text
    pub daily_stop_alert: Option<String>,
    /// Consecutive failed connection attempts
    pub reconnect_attempts: u32,
    /// Delay of the pending reconnect, if one is scheduled
    pub retry_delay: Option<Duration>,
    pub last_update: Option<DateTime<Utc>>,
}

impl ViewState {
    pub fn new(candle_limit: usize) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            market: MarketTick::default(),
            candles: CandleHistory::new(candle_limit),
            status: BotStatus::default(),
            position: None,
            summary: DailySummary::default(),
            trades: Vec::new(),
            analytics: TradeAnalytics::default(),
            logs: Vec::new(),
            config: ConfigMap::new(),
            indices: Vec::new(),
            timeframes: Vec::new(),
            strategies: Vec::new(),
            daily_stop_alert: None,
            reconnect_attempts: 0,
            retry_delay: None,
            last_update: None,
        }
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    /// Selection implied by the current bot status
    pub fn selection(&self) -> Selection {
        Selection::new(&self.status.selected_index, self.status.candle_interval)
    }

    /// Quantity implied by the cached config: `order_qty` lots of `lot_size`.
    ///
    /// The lot size comes from the config when present, otherwise from the
    /// index list for the selected index.
    pub fn configured_quantity(&self) -> Option<f64> {
        let lots = self.config.get("order_qty").and_then(|v| v.as_f64())?;
        let lot_size = self
            .config
            .get("lot_size")
            .and_then(|v| v.as_f64())
            .or_else(|| {
                self.indices
                    .iter()
                    .find(|idx| idx.name.eq_ignore_ascii_case(&self.status.selected_index))
                    .map(|idx| idx.lot_size as f64)
            })
            .filter(|size| *size > 0.0)
            .unwrap_or(1.0);
        Some(lots * lot_size)
    }

    /// Overwrite the market price only
    pub fn apply_tick(&mut self, tick: &TickData) {
        self.market.ltp = tick.ltp;
        self.market.updated_at = Some(Utc::now());
    }

    pub fn push_candle(&mut self, candle: &CandleData) {
        self.candles.push(candle.to_candle());
    }

    /// Shallow partial merge of a state-sync snapshot.
    ///
    /// Present fields overwrite, absent fields keep their previous value.
    /// The position slice is the exception: it is authoritative per snapshot,
    /// so an absent or null `position` means flat. Unrealized P&L is
    /// recomputed here on every call.
    pub fn merge_snapshot(&mut self, snapshot: StateSnapshot) {
        let StateSnapshot {
            is_running,
            mode,
            market_status,
            trading_enabled,
            selected_index,
            candle_interval,
            daily_max_loss_triggered,
            connection_status,
            index_ltp,
            signal_status,
            htf_signal_status,
            supertrend_value,
            macd_value,
            adx_value,
            mds_score,
            mds_slope,
            mds_acceleration,
            mds_stability,
            mds_confidence,
            mds_is_choppy,
            mds_direction,
            position,
            entry_price,
            current_option_ltp,
            trailing_sl,
            daily_trades,
            daily_pnl,
            max_drawdown,
        } = snapshot;

        let status = &mut self.status;
        merge(&mut status.is_running, is_running);
        merge(&mut status.mode, mode);
        merge(&mut status.market_status, market_status);
        merge(&mut status.trading_enabled, trading_enabled);
        merge(&mut status.selected_index, selected_index);
        merge(&mut status.candle_interval, candle_interval);
        merge(&mut status.daily_max_loss_triggered, daily_max_loss_triggered);
        merge_some(&mut status.connection_status, connection_status);

        merge(&mut self.market.ltp, index_ltp);
        let scores = &mut self.market.scores;
        merge_some(&mut scores.signal_status, signal_status);
        merge_some(&mut scores.htf_signal_status, htf_signal_status);
        merge_some(&mut scores.supertrend_value, supertrend_value);
        merge_some(&mut scores.macd_value, macd_value);
        merge_some(&mut scores.adx_value, adx_value);
        merge_some(&mut scores.mds_score, mds_score);
        merge_some(&mut scores.mds_slope, mds_slope);
        merge_some(&mut scores.mds_acceleration, mds_acceleration);
        merge_some(&mut scores.mds_stability, mds_stability);
        merge_some(&mut scores.mds_confidence, mds_confidence);
        merge_some(&mut scores.mds_is_choppy, mds_is_choppy);
        merge_some(&mut scores.mds_direction, mds_direction);

        let previous = self.position.take();
        self.position = match position {
            Some(payload) if !payload.is_flat() => Some(self.build_position(
                payload,
                previous.as_ref(),
                PositionFallbacks {
                    entry_price,
                    current_price: current_option_ltp,
                    trailing_sl,
                },
            )),
            _ => None,
        };

        merge(&mut self.summary.total_trades, daily_trades);
        merge(&mut self.summary.total_pnl, daily_pnl);
        merge(&mut self.summary.max_drawdown, max_drawdown);
        merge(&mut self.summary.daily_stop_triggered, daily_max_loss_triggered);

        self.last_update = Some(Utc::now());
    }

    /// Position body from `GET /api/position`
    pub fn apply_position(&mut self, payload: PositionSnapshot) {
        let previous = self.position.take();
        self.position = if payload.is_flat() {
            None
        } else {
            Some(self.build_position(payload, previous.as_ref(), PositionFallbacks::default()))
        };
    }

    pub fn apply_daily_stop(&mut self, alert: &DailyStopData) {
        self.summary.daily_stop_triggered = true;
        self.status.daily_max_loss_triggered = true;
        self.daily_stop_alert = Some(alert.alert_text());
    }

    fn build_position(
        &self,
        payload: PositionSnapshot,
        previous: Option<&Position>,
        fallbacks: PositionFallbacks,
    ) -> Position {
        let entry_price = payload
            .entry_price
            .or(fallbacks.entry_price)
            .or(previous.map(|p| p.entry_price))
            .unwrap_or(0.0);
        let current_price = payload
            .current_ltp
            .or(fallbacks.current_price)
            .or(previous.map(|p| p.current_price))
            .unwrap_or(entry_price);
        let quantity = payload
            .qty
            .filter(|qty| *qty > 0.0)
            .or_else(|| self.configured_quantity())
            .unwrap_or(0.0);

        Position {
            option_type: payload
                .option_type
                .or_else(|| previous.and_then(|p| p.option_type.clone())),
            strike: payload.strike.or(previous.and_then(|p| p.strike)),
            expiry: payload
                .expiry
                .or_else(|| previous.and_then(|p| p.expiry.clone())),
            index_name: payload
                .index_name
                .or_else(|| previous.and_then(|p| p.index_name.clone())),
            entry_price,
            current_price,
            quantity,
            unrealized_pnl: Position::estimate_pnl(entry_price, current_price, quantity),
            trailing_sl: payload
                .trailing_sl
                .or(fallbacks.trailing_sl)
                .or(previous.and_then(|p| p.trailing_sl)),
        }
    }
}

/// Top-level snapshot fields that stand in for missing position fields
#[derive(Debug, Default, Clone, Copy)]
struct PositionFallbacks {
    entry_price: Option<f64>,
    current_price: Option<f64>,
    trailing_sl: Option<f64>,
}

fn merge<T>(slot: &mut T, incoming: Option<T>) {
    if let Some(value) = incoming {
        *slot = value;
    }
}

fn merge_some<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// Shared handle to the view-state
#[derive(Debug)]
pub struct Store {
    state: RwLock<ViewState>,
    mounted: AtomicBool,
}

impl Store {
    pub fn new(candle_limit: usize) -> Self {
        Self {
            state: RwLock::new(ViewState::new(candle_limit)),
            mounted: AtomicBool::new(true),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ViewState> {
        self.state.read().await
    }

    /// Owned copy of the current state
    pub async fn snapshot(&self) -> ViewState {
        self.state.read().await.clone()
    }

    /// Apply a mutation. Returns `None` without touching the state once the
    /// client has been unmounted.
    pub async fn update<R>(&self, f: impl FnOnce(&mut ViewState) -> R) -> Option<R> {
        if !self.is_mounted() {
            return None;
        }
        let mut state = self.state.write().await;
        Some(f(&mut state))
    }

    pub async fn connection(&self) -> ConnectionState {
        self.state.read().await.connection
    }

    /// Set the connection indicator; returns the previous state
    pub async fn set_connection(&self, next: ConnectionState) -> ConnectionState {
        let mut state = self.state.write().await;
        let previous = state.connection;
        state.connection = next;
        if next == ConnectionState::Connected {
            state.reconnect_attempts = 0;
            state.retry_delay = None;
        }
        previous
    }

    /// Move `disconnected -> connecting`. False if a connection is already
    /// open or being opened.
    pub async fn begin_connecting(&self) -> bool {
        let mut state = self.state.write().await;
        if state.connection != ConnectionState::Disconnected {
            return false;
        }
        state.connection = ConnectionState::Connecting;
        true
    }

    /// Record a scheduled reconnect
    pub async fn note_retry(&self, delay: Duration) {
        let mut state = self.state.write().await;
        state.connection = ConnectionState::Disconnected;
        state.reconnect_attempts = state.reconnect_attempts.saturating_add(1);
        state.retry_delay = Some(delay);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }
}
