//! Backend REST API
//!
//! [`BackendApi`] is the seam between the client and the backend's `/api`
//! surface; [`HttpBackend`] implements it over reqwest.

mod rest;
mod types;

pub use rest::HttpBackend;
pub use types::*;

use async_trait::async_trait;

use crate::error::ClientResult;
use crate::feed::protocol::PositionSnapshot;
use crate::types::{
    BotStatus, ConfigMap, DailySummary, IndexInfo, LogEntry, TimeframeInfo, Trade,
    TradeAnalytics, TradingMode,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendApi: Send + Sync {
    // ── reads ────────────────────────────────────────────────────────
    async fn status(&self) -> ClientResult<BotStatus>;
    async fn position(&self) -> ClientResult<PositionSnapshot>;
    /// `None` fetches the whole history
    async fn trades(&self, limit: Option<u32>) -> ClientResult<Vec<Trade>>;
    async fn summary(&self) -> ClientResult<DailySummary>;
    async fn analytics(&self) -> ClientResult<TradeAnalytics>;
    /// `level` filters on the log level (`ERROR`, `INFO`, ...); `None` returns all
    async fn logs(&self, limit: u32, level: Option<String>) -> ClientResult<Vec<LogEntry>>;
    async fn config(&self) -> ClientResult<ConfigMap>;
    async fn indices(&self) -> ClientResult<Vec<IndexInfo>>;
    async fn timeframes(&self) -> ClientResult<Vec<TimeframeInfo>>;

    // ── bot commands ─────────────────────────────────────────────────
    async fn start_bot(&self) -> ClientResult<CommandResponse>;
    async fn stop_bot(&self) -> ClientResult<CommandResponse>;
    async fn square_off(&self) -> ClientResult<CommandResponse>;
    async fn update_config(&self, patch: ConfigMap) -> ClientResult<CommandResponse>;
    async fn set_mode(&self, mode: TradingMode) -> ClientResult<CommandResponse>;

    // ── strategy presets ─────────────────────────────────────────────
    async fn list_strategies(&self) -> ClientResult<Vec<StrategySummary>>;
    async fn save_strategy(&self, request: SaveStrategyRequest)
        -> ClientResult<StrategyResponse>;
    async fn rename_strategy(&self, id: i64, name: String) -> ClientResult<StrategyResponse>;
    async fn duplicate_strategy(&self, id: i64, name: String)
        -> ClientResult<StrategyResponse>;
    async fn delete_strategy(&self, id: i64) -> ClientResult<CommandResponse>;
    async fn apply_strategy(&self, id: i64, start: bool) -> ClientResult<ApplyStrategyResponse>;
    async fn export_strategies(&self) -> ClientResult<Vec<StrategyExport>>;
    async fn import_strategies(&self, strategies: Vec<StrategyExport>)
        -> ClientResult<ImportResult>;
}
