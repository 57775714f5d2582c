//! NiftyAlgo console
//!
//! Watches the bot's live state or runs one dashboard command against the
//! backend. Configuration comes from `config/*.yaml`, `.env` and
//! `NIFTYALGO__*` variables.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use niftyalgo_client::api::HttpBackend;
use niftyalgo_client::config::AppConfig;
use niftyalgo_client::export;
use niftyalgo_client::feed::WsConnector;
use niftyalgo_client::notify::Notification;
use niftyalgo_client::store::ViewState;
use niftyalgo_client::types::{ConnectionState, LogEntry, TradeAnalytics, TradingMode};
use niftyalgo_client::LiveClient;

#[derive(Parser)]
#[command(name = "niftyalgo-console")]
#[command(about = "Live console for the NiftyAlgo options trading bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live state and print a dashboard line periodically (default)
    Watch,
    /// Start the bot
    Start,
    /// Stop the bot
    Stop,
    /// Square off the open position
    Squareoff,
    /// Switch trading mode
    Mode {
        #[arg(value_parser = ["paper", "live"])]
        mode: String,
    },
    /// Change the traded index (NIFTY, BANKNIFTY, SENSEX, FINNIFTY)
    Index { name: String },
    /// Change the candle interval in seconds
    Interval { secs: u32 },
    /// Print the backend log tail
    Logs {
        /// Rows to fetch (max 500)
        limit: Option<u32>,
        /// Only rows of this level (ERROR, WARNING, INFO, DEBUG)
        #[arg(long)]
        level: Option<String>,
    },
    /// Print all-time trade statistics
    Analytics,
    /// List saved strategy presets
    Strategies,
    /// Apply a strategy preset
    Apply {
        id: i64,
        /// Start the bot after applying
        #[arg(long)]
        start: bool,
    },
    /// Save the current configuration as a strategy preset
    Save { name: String },
    /// Export strategy presets to a .json or .yaml file
    ExportStrategies { file: PathBuf },
    /// Import strategy presets from a .json or .yaml file
    ImportStrategies { file: PathBuf },
    /// Export the trade history to CSV
    ExportTrades { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(config.logging.json);
    info!(config = %config, "NiftyAlgo console starting");

    if let Some(Commands::Logs {
        limit: Some(limit), ..
    }) = &cli.command
    {
        config.feed.log_tail_limit = (*limit).clamp(1, 500);
    }

    let api = HttpBackend::new(&config.backend.base_url, config.request_timeout())
        .context("Failed to create REST client")?;
    info!(api = %api.api_root(), "Backend REST client ready");
    let client = LiveClient::new(config.client_settings()?, Arc::new(api));

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => watch(&client, &config).await,
        command => run_once(&client, command).await,
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// Mount, log notifications, print a dashboard line every interval,
/// unmount on Ctrl-C
async fn watch(client: &LiveClient, config: &AppConfig) -> Result<()> {
    let mut notes = client.notifications();
    client.mount(WsConnector::new(config.request_timeout())).await;

    let mut ticker = tokio::time::interval(config.dashboard_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                println!("{}", dashboard_line(&client.state().await));
            }
            note = notes.recv() => match note {
                Ok(note) => info!(level = %note.level, "{}", note.message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Ctrl-C handler failed");
                }
                info!("Shutting down");
                break;
            }
        }
    }

    client.unmount().await;
    Ok(())
}

/// Run one command, then always flush notifications and unmount
async fn run_once(client: &LiveClient, command: Commands) -> Result<()> {
    let mut notes = client.notifications();
    let outcome = execute(client, command).await;

    print_notifications(&mut notes);
    client.unmount().await;

    if !outcome? {
        bail!("Command failed");
    }
    Ok(())
}

async fn execute(client: &LiveClient, command: Commands) -> Result<bool> {
    let succeeded = match command {
        Commands::Watch => true,
        Commands::Start => client.start_bot().await.is_some(),
        Commands::Stop => client.stop_bot().await.is_some(),
        Commands::Squareoff => client.square_off().await.is_some(),
        Commands::Mode { mode } => {
            let mode = TradingMode::from_str(&mode).context("Unknown trading mode")?;
            client.set_mode(mode).await.is_some()
        }
        Commands::Index { name } => client.set_index(&name).await.is_some(),
        Commands::Interval { secs } => client.set_candle_interval(secs).await.is_some(),
        Commands::Logs { level, .. } => {
            let rows = match level {
                Some(level) => client.logs_at_level(&level).await,
                None => client.refresh_logs().await,
            };
            match rows {
                Some(rows) => {
                    print_logs(&rows);
                    true
                }
                None => false,
            }
        }
        Commands::Analytics => match client.analytics().await {
            Some(analytics) => {
                println!("{}", analytics_report(&analytics));
                true
            }
            None => false,
        },
        Commands::Strategies => match client.list_strategies().await {
            Some(strategies) => {
                for s in strategies {
                    println!(
                        "{:>4}  {:<24} applied={}",
                        s.id,
                        s.name,
                        s.applied_at.as_deref().unwrap_or("-")
                    );
                }
                true
            }
            None => false,
        },
        Commands::Apply { id, start } => client.apply_strategy(id, start).await.is_some(),
        Commands::Save { name } => client.save_strategy(&name, None).await.is_some(),
        Commands::ExportStrategies { file } => match client.export_strategies().await {
            Some(strategies) => {
                export::save_strategies(&file, &strategies)?;
                true
            }
            None => false,
        },
        Commands::ImportStrategies { file } => {
            let strategies = export::load_strategies(&file)?;
            client.import_strategies(strategies).await.is_some()
        }
        Commands::ExportTrades { file } => {
            if let Err(e) = client.refresher().trades().await {
                bail!("Failed to load trades: {}", e.user_message());
            }
            let trades = client.state().await.trades;
            export::save_trades_csv(&file, &trades)?;
            println!("Exported {} trades to {}", trades.len(), file.display());
            true
        }
    };
    Ok(succeeded)
}

fn print_logs(rows: &[LogEntry]) {
    for row in rows {
        println!("{} {:<7} {}", row.timestamp, row.level, row.message);
    }
}

fn analytics_report(a: &TradeAnalytics) -> String {
    let mut lines = vec![
        format!(
            "trades={} won={} lost={} win_rate={:.2}% pnl={:+.2}",
            a.total_trades, a.winning_trades, a.losing_trades, a.win_rate, a.total_pnl
        ),
        format!(
            "avg_win={:.2} avg_loss={:.2} profit_factor={:.2} sharpe={:.2}",
            a.avg_win, a.avg_loss, a.profit_factor, a.sharpe_ratio
        ),
        format!(
            "best={:+.2} worst={:+.2} max_drawdown={:.2} streaks={}W/{}L days={}",
            a.max_profit,
            a.max_loss,
            a.max_drawdown,
            a.max_consecutive_wins,
            a.max_consecutive_losses,
            a.trading_days
        ),
    ];
    for (group, stats) in [
        ("type", &a.trades_by_type),
        ("index", &a.trades_by_index),
        ("exit", &a.trades_by_exit_reason),
    ] {
        for (key, s) in stats {
            lines.push(format!(
                "  {group}:{key} count={} pnl={:+.2} win_rate={:.2}%",
                s.count, s.pnl, s.win_rate
            ));
        }
    }
    lines.join("\n")
}

fn print_notifications(rx: &mut broadcast::Receiver<Notification>) {
    loop {
        match rx.try_recv() {
            Ok(note) => println!("{}: {}", note.level, note.message),
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "Notifications dropped"),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

fn dashboard_line(state: &ViewState) -> String {
    let connection = match (state.connection, state.retry_delay) {
        (ConnectionState::Connected, _) => "live".to_string(),
        (ConnectionState::Connecting, _) => "connecting".to_string(),
        (ConnectionState::Disconnected, Some(delay)) => {
            format!("offline, retry in {}s", delay.as_secs())
        }
        (ConnectionState::Disconnected, None) => "offline".to_string(),
    };

    let bot = if state.status.is_running {
        "running"
    } else {
        "stopped"
    };

    let position = match &state.position {
        Some(p) => format!(
            "{} {} x{} @ {:.2} -> {:.2} ({:+.2})",
            p.option_type.as_deref().unwrap_or("?"),
            p.strike.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            p.quantity,
            p.entry_price,
            p.current_price,
            p.unrealized_pnl
        ),
        None => "flat".to_string(),
    };

    let mut line = format!(
        "[{connection}] {}/{}s ltp={:.2} bot={bot}({}) pos={position} day={:+.2} trades={}",
        state.status.selected_index,
        state.status.candle_interval,
        state.market.ltp,
        state.status.mode.as_str(),
        state.summary.total_pnl,
        state.summary.total_trades
    );
    if state.status.daily_max_loss_triggered {
        line.push_str(" DAILY STOP");
    }
    line
}
