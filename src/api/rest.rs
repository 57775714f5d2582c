//! reqwest implementation of [`BackendApi`]
//!
//! Non-2xx replies become [`ClientError::Http`] carrying the backend's
//! `detail`; 2xx replies whose body says `"status": "error"` become
//! [`ClientError::Rejected`].

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, RequestBuilder,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::types::{
    ApplyStrategyResponse, CommandResponse, ImportResult, SaveStrategyRequest,
    StrategiesEnvelope, StrategyExport, StrategyResponse, StrategySummary,
};
use super::BackendApi;
use crate::error::{ClientError, ClientResult};
use crate::feed::protocol::PositionSnapshot;
use crate::types::{
    BotStatus, ConfigMap, DailySummary, IndexInfo, LogEntry, TimeframeInfo, Trade,
    TradeAnalytics, TradingMode,
};

const MAX_DETAIL_CHARS: usize = 200;

/// REST client for the backend `/api` routes
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    api_root: Url,
}

impl HttpBackend {
    /// `base_url` is the backend origin (`http://host:8001`); a trailing
    /// `/api` is accepted too.
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_root: api_root(base_url)?,
        })
    }

    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        Ok(self.api_root.join(path.trim_start_matches('/'))?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let url = self.endpoint(path)?;
        self.execute(self.client.get(url)).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Option<&Value>) -> ClientResult<T> {
        let url = self.endpoint(path)?;
        let request = match body {
            Some(body) => self.client.post(url).json(body),
            None => self.client.post(url).body("{}"),
        };
        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "Backend response");

        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                detail: extract_detail(&body),
            });
        }

        let value: Value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body)?
        };

        if let Some(message) = rejection_message(&value) {
            return Err(ClientError::Rejected(message));
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// `http://host:8001` -> `http://host:8001/api/`
fn api_root(base_url: &str) -> ClientResult<Url> {
    let mut root = Url::parse(base_url.trim())?;
    let path = root.path().trim_end_matches('/').to_string();
    let path = if path.ends_with("/api") {
        format!("{path}/")
    } else {
        format!("{path}/api/")
    };
    root.set_path(&path);
    root.set_query(None);
    Ok(root)
}

/// Human-readable reason from an error body.
///
/// Handles FastAPI's `{"detail": "..."}`, validation lists
/// `{"detail": [{"msg": "..."}]}`, `{"message"|"error": "..."}` and plain
/// text.
/// `logs?limit=N[&level=L]`; `all` and blank levels mean no filter
fn logs_path(limit: u32, level: Option<&str>) -> String {
    match level.map(str::trim).filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("all")) {
        Some(level) => format!("logs?limit={limit}&level={}", level.to_uppercase()),
        None => format!("logs?limit={limit}"),
    }
}

fn extract_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return Some(trimmed.chars().take(MAX_DETAIL_CHARS).collect());
    };

    match value.get("detail") {
        Some(Value::String(detail)) => return Some(detail.clone()),
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return Some(joined);
            }
        }
        _ => {}
    }

    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Message of a `{"status": "error", ...}` body
fn rejection_message(value: &Value) -> Option<String> {
    let status = value.get("status").and_then(|v| v.as_str())?;
    if !status.eq_ignore_ascii_case("error") {
        return None;
    }
    Some(
        value
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
    )
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn status(&self) -> ClientResult<BotStatus> {
        self.get("status").await
    }

    async fn position(&self) -> ClientResult<PositionSnapshot> {
        self.get("position").await
    }

    async fn trades(&self, limit: Option<u32>) -> ClientResult<Vec<Trade>> {
        match limit {
            Some(limit) => self.get(&format!("trades?limit={limit}")).await,
            None => self.get("trades").await,
        }
    }

    async fn summary(&self) -> ClientResult<DailySummary> {
        self.get("summary").await
    }

    async fn analytics(&self) -> ClientResult<TradeAnalytics> {
        self.get("analytics").await
    }

    async fn logs(&self, limit: u32, level: Option<String>) -> ClientResult<Vec<LogEntry>> {
        self.get(&logs_path(limit, level.as_deref())).await
    }

    async fn config(&self) -> ClientResult<ConfigMap> {
        self.get("config").await
    }

    async fn indices(&self) -> ClientResult<Vec<IndexInfo>> {
        self.get("indices").await
    }

    async fn timeframes(&self) -> ClientResult<Vec<TimeframeInfo>> {
        self.get("timeframes").await
    }

    async fn start_bot(&self) -> ClientResult<CommandResponse> {
        self.post("bot/start", None).await
    }

    async fn stop_bot(&self) -> ClientResult<CommandResponse> {
        self.post("bot/stop", None).await
    }

    async fn square_off(&self) -> ClientResult<CommandResponse> {
        self.post("bot/squareoff", None).await
    }

    async fn update_config(&self, patch: ConfigMap) -> ClientResult<CommandResponse> {
        self.post("config/update", Some(&Value::Object(patch))).await
    }

    async fn set_mode(&self, mode: TradingMode) -> ClientResult<CommandResponse> {
        self.post(&format!("config/mode?mode={}", mode.as_str()), None)
            .await
    }

    async fn list_strategies(&self) -> ClientResult<Vec<StrategySummary>> {
        self.get("strategies").await
    }

    async fn save_strategy(&self, request: SaveStrategyRequest) -> ClientResult<StrategyResponse> {
        let body = serde_json::to_value(&request)?;
        self.post("strategies", Some(&body)).await
    }

    async fn rename_strategy(&self, id: i64, name: String) -> ClientResult<StrategyResponse> {
        let url = self.endpoint(&format!("strategies/{id}"))?;
        let body = serde_json::json!({ "name": name });
        self.execute(self.client.patch(url).json(&body)).await
    }

    async fn duplicate_strategy(&self, id: i64, name: String) -> ClientResult<StrategyResponse> {
        let body = serde_json::json!({ "name": name });
        self.post(&format!("strategies/{id}/duplicate"), Some(&body))
            .await
    }

    async fn delete_strategy(&self, id: i64) -> ClientResult<CommandResponse> {
        let url = self.endpoint(&format!("strategies/{id}"))?;
        self.execute(self.client.delete(url)).await
    }

    async fn apply_strategy(&self, id: i64, start: bool) -> ClientResult<ApplyStrategyResponse> {
        let path = if start {
            format!("strategies/{id}/apply?start=true")
        } else {
            format!("strategies/{id}/apply")
        };
        self.post(&path, None).await
    }

    async fn export_strategies(&self) -> ClientResult<Vec<StrategyExport>> {
        let envelope: StrategiesEnvelope = self.get("strategies/export").await?;
        Ok(envelope.strategies)
    }

    async fn import_strategies(
        &self,
        strategies: Vec<StrategyExport>,
    ) -> ClientResult<ImportResult> {
        let body = serde_json::to_value(StrategiesEnvelope { strategies })?;
        self.post("strategies/import", Some(&body)).await
    }
}
