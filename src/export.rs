//! File export/import for the console
//!
//! Trade history goes to CSV. Strategy presets round-trip through JSON or
//! YAML, picked by file extension, in the backend's `{"strategies": [...]}`
//! envelope.

use anyhow::{bail, Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

use crate::api::{StrategiesEnvelope, StrategyExport};
use crate::types::Trade;

/// Flat CSV row of a closed or open trade
#[derive(Debug, Serialize)]
struct TradeRow<'a> {
    trade_id: &'a str,
    index_name: &'a str,
    option_type: &'a str,
    strike: i64,
    expiry: &'a str,
    entry_time: &'a str,
    exit_time: &'a str,
    entry_price: f64,
    exit_price: Option<f64>,
    pnl: Option<f64>,
    exit_reason: &'a str,
}

impl<'a> From<&'a Trade> for TradeRow<'a> {
    fn from(trade: &'a Trade) -> Self {
        Self {
            trade_id: &trade.trade_id,
            index_name: trade.index_name.as_deref().unwrap_or(""),
            option_type: &trade.option_type,
            strike: trade.strike,
            expiry: &trade.expiry,
            entry_time: &trade.entry_time,
            exit_time: trade.exit_time.as_deref().unwrap_or(""),
            entry_price: trade.entry_price,
            exit_price: trade.exit_price,
            pnl: trade.pnl,
            exit_reason: trade.exit_reason.as_deref().unwrap_or(""),
        }
    }
}

/// Write trades as CSV with a header row
pub fn write_trades<W: Write>(writer: W, trades: &[Trade]) -> Result<()> {
    let mut csv = WriterBuilder::new().has_headers(true).from_writer(writer);
    for trade in trades {
        csv.serialize(TradeRow::from(trade))
            .context("Failed to write trade row")?;
    }
    csv.flush().context("Failed to flush trades CSV")?;
    Ok(())
}

pub fn save_trades_csv(path: &Path, trades: &[Trade]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_trades(file, trades)?;
    info!(path = %path.display(), trades = trades.len(), "Trades exported");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyFormat {
    Json,
    Yaml,
}

impl StrategyFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => bail!(
                "Unsupported strategy file {}: use .json, .yaml or .yml",
                path.display()
            ),
        }
    }
}

pub fn encode_strategies(strategies: &[StrategyExport], format: StrategyFormat) -> Result<String> {
    let envelope = StrategiesEnvelope {
        strategies: strategies.to_vec(),
    };
    let text = match format {
        StrategyFormat::Json => serde_json::to_string_pretty(&envelope)?,
        StrategyFormat::Yaml => serde_yaml::to_string(&envelope)?,
    };
    Ok(text)
}

/// Accepts the envelope or a bare list
pub fn decode_strategies(text: &str, format: StrategyFormat) -> Result<Vec<StrategyExport>> {
    let value: serde_json::Value = match format {
        StrategyFormat::Json => serde_json::from_str(text).context("Invalid JSON")?,
        StrategyFormat::Yaml => serde_yaml::from_str(text).context("Invalid YAML")?,
    };
    let strategies = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        serde_json::from_value::<StrategiesEnvelope>(value)?.strategies
    };
    Ok(strategies)
}

pub fn save_strategies(path: &Path, strategies: &[StrategyExport]) -> Result<()> {
    let text = encode_strategies(strategies, StrategyFormat::from_path(path)?)?;
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(text.as_bytes())?;
    info!(path = %path.display(), strategies = strategies.len(), "Strategies exported");
    Ok(())
}

pub fn load_strategies(path: &Path) -> Result<Vec<StrategyExport>> {
    let format = StrategyFormat::from_path(path)?;
    let mut text = String::new();
    File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .read_to_string(&mut text)?;
    decode_strategies(&text, format).with_context(|| format!("Failed to parse {}", path.display()))
}
