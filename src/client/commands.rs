//! Dashboard command functions
//!
//! Each command calls one REST endpoint, reports the outcome as a
//! notification and refreshes the slices it touched. A command never
//! returns an error: `None` means it failed and the user was told why.

use serde_json::Value;
use tracing::{debug, warn};

use super::refresh::Slice;
use super::LiveClient;
use crate::api::{
    ApplyStrategyResponse, CommandResponse, ImportResult, SaveStrategyRequest, StrategyExport,
    StrategyResponse, StrategySummary,
};
use crate::error::ClientResult;
use crate::types::{ConfigMap, LogEntry, Selection, TradeAnalytics, TradingMode};

const SELECTED_INDEX: &str = "selected_index";
const CANDLE_INTERVAL: &str = "candle_interval";

impl LiveClient {
    /// Report `result` to the user. After unmount nothing is reported.
    fn settle<T>(
        &self,
        action: &str,
        result: ClientResult<T>,
        success: impl FnOnce(&T) -> Option<String>,
    ) -> Option<T> {
        if !self.store.is_mounted() {
            debug!(action, "Discarding result after unmount");
            return None;
        }
        match result {
            Ok(value) => {
                if let Some(message) = success(&value) {
                    self.notifier.success(message);
                }
                Some(value)
            }
            Err(e) => {
                warn!(action, error = %e, "Command failed");
                self.notifier
                    .error(format!("Failed to {action}: {}", e.user_message()));
                None
            }
        }
    }

    fn reject<T>(&self, message: &str) -> Option<T> {
        self.notifier.error(message);
        None
    }

    // ── bot control ────────────────────────────────────────────────────

    pub async fn start_bot(&self) -> Option<CommandResponse> {
        let result = self.api.start_bot().await;
        let response = self.settle("start bot", result, |r| Some(r.message_or("Bot started")))?;
        self.refresher.after_command(&[Slice::Status]).await;
        Some(response)
    }

    pub async fn stop_bot(&self) -> Option<CommandResponse> {
        let result = self.api.stop_bot().await;
        let response = self.settle("stop bot", result, |r| Some(r.message_or("Bot stopped")))?;
        self.refresher.after_command(&[Slice::Status]).await;
        Some(response)
    }

    /// Close the open position at market
    pub async fn square_off(&self) -> Option<CommandResponse> {
        let result = self.api.square_off().await;
        let response = self.settle("square off", result, |r| {
            Some(r.message_or("Position squared off"))
        })?;
        self.refresher
            .after_command(&[
                Slice::Position,
                Slice::Trades,
                Slice::Summary,
                Slice::Analytics,
                Slice::Status,
            ])
            .await;
        Some(response)
    }

    // ── configuration ──────────────────────────────────────────────────

    /// Send a partial config update. A patch touching the index or the
    /// candle interval also moves the feed selection.
    pub async fn update_config(&self, patch: ConfigMap) -> Option<CommandResponse> {
        self.apply_config(patch, "save settings", "Settings saved".to_string())
            .await
    }

    pub async fn set_mode(&self, mode: TradingMode) -> Option<CommandResponse> {
        let result = self.api.set_mode(mode).await;
        let fallback = format!("Switched to {} mode", mode.as_str());
        let response = self.settle("change mode", result, |r| Some(r.message_or(&fallback)))?;
        self.refresher
            .after_command(&[Slice::Status, Slice::Config])
            .await;
        Some(response)
    }

    pub async fn set_index(&self, index: &str) -> Option<CommandResponse> {
        let index = index.trim().to_uppercase();
        if index.is_empty() {
            return self.reject("Index name is required");
        }
        let mut patch = ConfigMap::new();
        patch.insert(SELECTED_INDEX.to_string(), Value::String(index.clone()));
        self.apply_config(patch, "change index", format!("Index changed to {index}"))
            .await
    }

    pub async fn set_candle_interval(&self, interval_secs: u32) -> Option<CommandResponse> {
        if interval_secs == 0 {
            return self.reject("Candle interval must be positive");
        }
        let mut patch = ConfigMap::new();
        patch.insert(CANDLE_INTERVAL.to_string(), Value::from(interval_secs));
        self.apply_config(
            patch,
            "change timeframe",
            format!("Timeframe changed to {}", interval_label(interval_secs)),
        )
        .await
    }

    async fn apply_config(
        &self,
        patch: ConfigMap,
        action: &str,
        fallback: String,
    ) -> Option<CommandResponse> {
        let target = selection_in_patch(&self.selection.get(), &patch);

        let result = self.api.update_config(patch).await;
        let response = self.settle(action, result, |r| Some(r.message_or(&fallback)))?;

        // Only a confirmed change moves the subscription
        if let Some(target) = target {
            self.subscription.change(target).await;
        }
        self.refresher
            .after_command(&[Slice::Config, Slice::Status])
            .await;
        Some(response)
    }

    // ── logs ───────────────────────────────────────────────────────────

    /// Re-fetch the log tail
    pub async fn refresh_logs(&self) -> Option<Vec<LogEntry>> {
        let result = self.refresher.logs().await;
        self.settle("load logs", result, |_| None)?;
        Some(self.store.read().await.logs.clone())
    }

    /// Log tail filtered to one level (`ERROR`, `WARNING`, ...). The rows
    /// are returned only; the cached tail stays unfiltered.
    pub async fn logs_at_level(&self, level: &str) -> Option<Vec<LogEntry>> {
        let level = level.trim();
        if level.is_empty() {
            return self.reject("Log level is required");
        }
        let result = self
            .api
            .logs(self.settings.log_tail_limit, Some(level.to_string()))
            .await;
        self.settle("load logs", result, |_| None)
    }

    // ── analytics ──────────────────────────────────────────────────────

    pub async fn analytics(&self) -> Option<TradeAnalytics> {
        let result = self.refresher.analytics().await;
        self.settle("load analytics", result, |_| None)?;
        Some(self.store.read().await.analytics.clone())
    }

    // ── strategy presets ───────────────────────────────────────────────

    pub async fn list_strategies(&self) -> Option<Vec<StrategySummary>> {
        let result = self.refresher.strategies().await;
        self.settle("load strategies", result, |_| None)?;
        Some(self.store.read().await.strategies.clone())
    }

    /// Save a preset. Without `config` the backend stores its current one.
    pub async fn save_strategy(
        &self,
        name: &str,
        config: Option<ConfigMap>,
    ) -> Option<StrategyResponse> {
        let name = name.trim();
        if name.is_empty() {
            return self.reject("Strategy name is required");
        }
        let request = SaveStrategyRequest {
            name: name.to_string(),
            config,
        };
        let result = self.api.save_strategy(request).await;
        let response = self.settle("save strategy", result, |r| {
            Some(format!("Strategy '{}' saved", r.strategy.name))
        })?;
        self.refresher.after_command(&[Slice::Strategies]).await;
        Some(response)
    }

    pub async fn rename_strategy(&self, id: i64, name: &str) -> Option<StrategyResponse> {
        let name = name.trim();
        if name.is_empty() {
            return self.reject("Strategy name is required");
        }
        let result = self.api.rename_strategy(id, name.to_string()).await;
        let response = self.settle("rename strategy", result, |r| {
            Some(format!("Strategy renamed to '{}'", r.strategy.name))
        })?;
        self.refresher.after_command(&[Slice::Strategies]).await;
        Some(response)
    }

    pub async fn duplicate_strategy(&self, id: i64, name: &str) -> Option<StrategyResponse> {
        let name = name.trim();
        if name.is_empty() {
            return self.reject("Strategy name is required");
        }
        let result = self.api.duplicate_strategy(id, name.to_string()).await;
        let response = self.settle("duplicate strategy", result, |r| {
            Some(format!("Strategy '{}' created", r.strategy.name))
        })?;
        self.refresher.after_command(&[Slice::Strategies]).await;
        Some(response)
    }

    pub async fn delete_strategy(&self, id: i64) -> Option<CommandResponse> {
        let result = self.api.delete_strategy(id).await;
        let response = self.settle("delete strategy", result, |r| {
            Some(r.message_or("Strategy deleted"))
        })?;
        self.refresher.after_command(&[Slice::Strategies]).await;
        Some(response)
    }

    /// Load a preset into the live config, optionally starting the bot
    pub async fn apply_strategy(&self, id: i64, start: bool) -> Option<ApplyStrategyResponse> {
        let result = self.api.apply_strategy(id, start).await;
        let response = self.settle("apply strategy", result, |r| {
            let fallback = if start {
                "Strategy applied and bot started"
            } else {
                "Strategy applied"
            };
            Some(
                r.message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| fallback.to_string()),
            )
        })?;
        self.refresher
            .after_command(&[Slice::Config, Slice::Status, Slice::Strategies])
            .await;
        Some(response)
    }

    pub async fn export_strategies(&self) -> Option<Vec<StrategyExport>> {
        let result = self.api.export_strategies().await;
        self.settle("export strategies", result, |list| {
            Some(format!("Exported {} strategies", list.len()))
        })
    }

    pub async fn import_strategies(
        &self,
        strategies: Vec<StrategyExport>,
    ) -> Option<ImportResult> {
        if strategies.is_empty() {
            return self.reject("Nothing to import");
        }
        let result = self.api.import_strategies(strategies).await;
        let response = self.settle("import strategies", result, |r| {
            Some(format!("Imported {} strategies", r.imported))
        })?;
        self.refresher.after_command(&[Slice::Strategies]).await;
        Some(response)
    }
}

/// Selection a config patch would switch to, if it touches either key
fn selection_in_patch(current: &Selection, patch: &ConfigMap) -> Option<Selection> {
    let index = patch.get(SELECTED_INDEX).and_then(|v| v.as_str());
    let interval = patch
        .get(CANDLE_INTERVAL)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok());

    if index.is_none() && interval.is_none() {
        return None;
    }
    Some(Selection::new(
        index.unwrap_or(&current.index),
        interval.unwrap_or(current.interval_secs),
    ))
}

/// `5 -> "5s"`, `60 -> "1m"`, `900 -> "15m"`
pub(crate) fn interval_label(secs: u32) -> String {
    if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockBackendApi;
    use crate::client::ClientSettings;
    use crate::error::ClientError;
    use crate::notify::Level;
    use crate::store::Store;
    use crate::types::{BotStatus, ConnectionState};
    use std::sync::Arc;
    use url::Url;

    fn client(api: MockBackendApi) -> LiveClient {
        let url = Url::parse("ws://localhost:8001/ws").expect("url");
        LiveClient::new(ClientSettings::new(url), Arc::new(api))
    }

    fn ok(message: Option<&str>) -> CommandResponse {
        CommandResponse {
            status: Some("success".into()),
            message: message.map(str::to_string),
            ..Default::default()
        }
    }

    fn status_with(index: &str, interval: u32) -> BotStatus {
        BotStatus {
            selected_index: index.into(),
            candle_interval: interval,
            ..Default::default()
        }
    }

    #[test]
    fn interval_labels() {
        assert_eq!(interval_label(5), "5s");
        assert_eq!(interval_label(30), "30s");
        assert_eq!(interval_label(60), "1m");
        assert_eq!(interval_label(900), "15m");
        assert_eq!(interval_label(90), "90s");
    }

    #[test]
    fn patch_selection_merges_with_current() {
        let current = Selection::new("NIFTY", 5);
        let mut patch = ConfigMap::new();
        assert_eq!(selection_in_patch(&current, &patch), None);

        patch.insert(CANDLE_INTERVAL.into(), Value::from(300));
        assert_eq!(
            selection_in_patch(&current, &patch),
            Some(Selection::new("NIFTY", 300))
        );

        patch.insert(SELECTED_INDEX.into(), Value::from("finnifty"));
        assert_eq!(
            selection_in_patch(&current, &patch),
            Some(Selection::new("FINNIFTY", 300))
        );
    }

    #[tokio::test]
    async fn start_bot_notifies_backend_message_and_refreshes_status() {
        let mut api = MockBackendApi::new();
        api.expect_start_bot()
            .times(1)
            .returning(|| Ok(ok(Some("Bot started in paper mode"))));
        api.expect_status().times(1).returning(|| {
            Ok(BotStatus {
                is_running: true,
                ..Default::default()
            })
        });
        let client = client(api);
        let mut rx = client.notifications();

        assert!(client.start_bot().await.is_some());

        let note = rx.try_recv().expect("notification");
        assert_eq!(note.level, Level::Success);
        assert_eq!(note.message, "Bot started in paper mode");
        assert!(client.state().await.status.is_running);
    }

    #[tokio::test]
    async fn failed_command_surfaces_backend_detail() {
        let mut api = MockBackendApi::new();
        api.expect_square_off().times(1).returning(|| {
            Err(ClientError::Http {
                status: 400,
                detail: Some("No open position".into()),
            })
        });
        let client = client(api);
        let mut rx = client.notifications();

        assert!(client.square_off().await.is_none());

        let note = rx.try_recv().expect("notification");
        assert_eq!(note.level, Level::Error);
        assert_eq!(note.message, "Failed to square off: No open position");
    }

    #[tokio::test]
    async fn set_index_while_connected_resubscribes_and_clears_candles() {
        let mut api = MockBackendApi::new();
        api.expect_update_config()
            .withf(|patch| patch.get("selected_index") == Some(&Value::from("BANKNIFTY")))
            .times(1)
            .returning(|_| Ok(ok(None)));
        api.expect_config().returning(|| Ok(ConfigMap::new()));
        api.expect_status()
            .returning(|| Ok(status_with("BANKNIFTY", 5)));
        let client = client(api);
        let store: Arc<Store> = client.store();
        store
            .set_connection(ConnectionState::Connected)
            .await;
        store
            .update(|s| {
                s.candles.push(crate::types::Candle {
                    timestamp: 1,
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 1.0,
                })
            })
            .await;

        assert!(client.set_index("banknifty").await.is_some());

        assert_eq!(client.selection(), Selection::new("BANKNIFTY", 5));
        assert!(client.state().await.candles.is_empty());
        let mut rx = client.resubscribe_rx.lock().await.take().expect("receiver");
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_interval_change_keeps_selection() {
        let mut api = MockBackendApi::new();
        api.expect_update_config()
            .times(1)
            .returning(|_| Err(ClientError::Rejected("Invalid timeframe".into())));
        let client = client(api);
        let mut rx = client.notifications();

        assert!(client.set_candle_interval(7).await.is_none());

        assert_eq!(client.selection(), Selection::new("NIFTY", 5));
        let note = rx.try_recv().expect("notification");
        assert_eq!(note.message, "Failed to change timeframe: Invalid timeframe");
    }

    #[tokio::test]
    async fn empty_names_never_reach_the_backend() {
        let client = client(MockBackendApi::new());
        let mut rx = client.notifications();

        assert!(client.save_strategy("   ", None).await.is_none());
        assert!(client.set_index("").await.is_none());

        assert_eq!(rx.try_recv().expect("first").level, Level::Error);
        assert_eq!(rx.try_recv().expect("second").level, Level::Error);
    }

    #[tokio::test]
    async fn results_after_unmount_are_not_reported() {
        let mut api = MockBackendApi::new();
        api.expect_stop_bot().returning(|| Ok(ok(None)));
        let client = client(api);
        let mut rx = client.notifications();

        client.unmount().await;
        assert!(client.stop_bot().await.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn apply_strategy_with_start_refreshes_config_and_list() {
        let mut api = MockBackendApi::new();
        api.expect_apply_strategy()
            .withf(|id, start| *id == 7 && *start)
            .times(1)
            .returning(|_, _| Ok(ApplyStrategyResponse::default()));
        api.expect_config().times(1).returning(|| {
            let mut config = ConfigMap::new();
            config.insert("order_qty".into(), Value::from(2));
            Ok(config)
        });
        api.expect_status()
            .times(1)
            .returning(|| Ok(status_with("NIFTY", 5)));
        api.expect_list_strategies().times(1).returning(|| {
            Ok(vec![StrategySummary {
                id: 7,
                name: "Momentum".into(),
                ..Default::default()
            }])
        });
        let client = client(api);
        let mut rx = client.notifications();

        assert!(client.apply_strategy(7, true).await.is_some());

        assert_eq!(
            rx.try_recv().expect("notification").message,
            "Strategy applied and bot started"
        );
        let state = client.state().await;
        assert_eq!(state.strategies.len(), 1);
        assert_eq!(state.config.get("order_qty"), Some(&Value::from(2)));
    }

    #[tokio::test]
    async fn filtered_logs_leave_cached_tail_alone() {
        let mut api = MockBackendApi::new();
        api.expect_logs()
            .withf(|limit, level| *limit == 100 && level.as_deref() == Some("ERROR"))
            .times(1)
            .returning(|_, _| {
                Ok(vec![LogEntry {
                    level: "ERROR".into(),
                    message: "Order rejected".into(),
                    ..Default::default()
                }])
            });
        let client = client(api);

        let rows = client.logs_at_level("ERROR").await.expect("rows");

        assert_eq!(rows.len(), 1);
        assert!(client.state().await.logs.is_empty());
        assert!(client.logs_at_level("  ").await.is_none());
    }

    #[tokio::test]
    async fn analytics_failure_is_reported() {
        let mut api = MockBackendApi::new();
        api.expect_analytics().times(1).returning(|| {
            Err(ClientError::Http {
                status: 500,
                detail: Some("database is locked".into()),
            })
        });
        let client = client(api);
        let mut rx = client.notifications();

        assert!(client.analytics().await.is_none());

        assert_eq!(
            rx.try_recv().expect("notification").message,
            "Failed to load analytics: database is locked"
        );
    }
}
