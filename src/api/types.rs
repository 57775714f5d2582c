//! REST request/response DTOs
//!
//! Bodies of the command and strategy endpoints. Read endpoints decode
//! straight into the view-state types in `crate::types`.

use serde::{Deserialize, Serialize};

use crate::types::ConfigMap;

/// Generic command reply, e.g. `{"status": "success", "message": "..."}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: ConfigMap,
}

impl CommandResponse {
    /// Backend message, or `fallback` when it sent none
    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

/// Saved strategy preset as listed by `GET /api/strategies`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub applied_at: Option<String>,
}

/// Body of `POST /api/strategies`. Without `config` the backend snapshots
/// its current configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveStrategyRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigMap>,
}

/// Reply of save/rename/duplicate
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrategyResponse {
    #[serde(default)]
    pub status: Option<String>,
    pub strategy: StrategySummary,
}

/// Strategy identity echoed by apply
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppliedStrategy {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Reply of `POST /api/strategies/{id}/apply`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApplyStrategyResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub strategy: Option<AppliedStrategy>,
    /// Present when the bot was started as part of the apply
    #[serde(default)]
    pub start: Option<CommandResponse>,
}

/// Portable strategy record used by export/import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyExport {
    pub name: String,
    #[serde(default)]
    pub config: ConfigMap,
}

/// `{"strategies": [...]}` envelope of export/import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategiesEnvelope {
    #[serde(default)]
    pub strategies: Vec<StrategyExport>,
}

/// Reply of `POST /api/strategies/import`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImportResult {
    #[serde(default)]
    pub imported: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_response_keeps_extra_fields() {
        let resp: CommandResponse = serde_json::from_value(json!({
            "status": "success",
            "message": "Configuration updated",
            "updated": ["order_qty"]
        }))
        .expect("decodes");

        assert_eq!(resp.message_or("ok"), "Configuration updated");
        assert_eq!(resp.extra.get("updated"), Some(&json!(["order_qty"])));

        let bare = CommandResponse::default();
        assert_eq!(bare.message_or("Bot started"), "Bot started");
    }

    #[test]
    fn save_request_omits_missing_config() {
        let body = serde_json::to_value(SaveStrategyRequest {
            name: "scalp".to_string(),
            config: None,
        })
        .expect("serializes");
        assert_eq!(body, json!({ "name": "scalp" }));
    }

    #[test]
    fn apply_response_with_start() {
        let resp: ApplyStrategyResponse = serde_json::from_value(json!({
            "status": "success",
            "message": "Applied strategy 'scalp' and started bot",
            "strategy": { "id": 4, "name": "scalp" },
            "apply": { "status": "success" },
            "start": { "status": "success", "message": "Bot started" }
        }))
        .expect("decodes");

        assert_eq!(resp.strategy.and_then(|s| s.id), Some(4));
        assert_eq!(
            resp.start.and_then(|s| s.message).as_deref(),
            Some("Bot started")
        );
    }
}
