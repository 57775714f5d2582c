//! End-to-end tests of the live client against in-memory fakes
//!
//! The feed runs through the real supervisor; time is paused so backoff
//! delays can be asserted exactly.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use niftyalgo_client::api::{
    ApplyStrategyResponse, BackendApi, CommandResponse, ImportResult, SaveStrategyRequest,
    StrategyExport, StrategyResponse, StrategySummary,
};
use niftyalgo_client::feed::protocol::PositionSnapshot;
use niftyalgo_client::feed::{Connector, Socket};
use niftyalgo_client::types::{
    BotStatus, ConfigMap, ConnectionState, DailySummary, IndexInfo, LogEntry, TimeframeInfo,
    Trade, TradeAnalytics, TradingMode,
};
use niftyalgo_client::{ClientError, ClientResult, ClientSettings, LiveClient};

// ── fake backend ───────────────────────────────────────────────────────

#[derive(Default)]
struct FakeBackend {
    status: Mutex<BotStatus>,
    status_calls: AtomicUsize,
    trades_calls: AtomicUsize,
    logs_calls: AtomicUsize,
    /// Latency of `GET /api/trades`
    trades_delay: Option<Duration>,
}

impl FakeBackend {
    fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn status(&self) -> ClientResult<BotStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.lock().expect("status lock").clone())
    }

    async fn position(&self) -> ClientResult<PositionSnapshot> {
        Ok(PositionSnapshot::default())
    }

    async fn trades(&self, _limit: Option<u32>) -> ClientResult<Vec<Trade>> {
        self.trades_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.trades_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(vec![Trade {
            trade_id: "T1".into(),
            pnl: Some(1300.0),
            ..Default::default()
        }])
    }

    async fn summary(&self) -> ClientResult<DailySummary> {
        Ok(DailySummary::default())
    }

    async fn analytics(&self) -> ClientResult<TradeAnalytics> {
        Ok(TradeAnalytics::default())
    }

    async fn logs(&self, _limit: u32, _level: Option<String>) -> ClientResult<Vec<LogEntry>> {
        self.logs_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn config(&self) -> ClientResult<ConfigMap> {
        Ok(ConfigMap::new())
    }

    async fn indices(&self) -> ClientResult<Vec<IndexInfo>> {
        Ok(Vec::new())
    }

    async fn timeframes(&self) -> ClientResult<Vec<TimeframeInfo>> {
        Ok(Vec::new())
    }

    async fn start_bot(&self) -> ClientResult<CommandResponse> {
        Ok(CommandResponse::default())
    }

    async fn stop_bot(&self) -> ClientResult<CommandResponse> {
        Ok(CommandResponse::default())
    }

    async fn square_off(&self) -> ClientResult<CommandResponse> {
        Err(ClientError::Http {
            status: 400,
            detail: Some("No open position".into()),
        })
    }

    async fn update_config(&self, patch: ConfigMap) -> ClientResult<CommandResponse> {
        let mut status = self.status.lock().expect("status lock");
        if let Some(index) = patch.get("selected_index").and_then(|v| v.as_str()) {
            status.selected_index = index.to_string();
        }
        if let Some(interval) = patch.get("candle_interval").and_then(|v| v.as_u64()) {
            status.candle_interval = interval as u32;
        }
        Ok(CommandResponse::default())
    }

    async fn set_mode(&self, mode: TradingMode) -> ClientResult<CommandResponse> {
        self.status.lock().expect("status lock").mode = mode;
        Ok(CommandResponse::default())
    }

    async fn list_strategies(&self) -> ClientResult<Vec<StrategySummary>> {
        Ok(Vec::new())
    }

    async fn save_strategy(&self, request: SaveStrategyRequest) -> ClientResult<StrategyResponse> {
        Ok(StrategyResponse {
            status: Some("success".into()),
            strategy: StrategySummary {
                id: 1,
                name: request.name,
                ..Default::default()
            },
        })
    }

    async fn rename_strategy(&self, id: i64, name: String) -> ClientResult<StrategyResponse> {
        Ok(StrategyResponse {
            status: None,
            strategy: StrategySummary {
                id,
                name,
                ..Default::default()
            },
        })
    }

    async fn duplicate_strategy(&self, _id: i64, name: String) -> ClientResult<StrategyResponse> {
        self.rename_strategy(2, name).await
    }

    async fn delete_strategy(&self, _id: i64) -> ClientResult<CommandResponse> {
        Ok(CommandResponse::default())
    }

    async fn apply_strategy(&self, _id: i64, _start: bool) -> ClientResult<ApplyStrategyResponse> {
        Ok(ApplyStrategyResponse::default())
    }

    async fn export_strategies(&self) -> ClientResult<Vec<StrategyExport>> {
        Ok(Vec::new())
    }

    async fn import_strategies(&self, strategies: Vec<StrategyExport>) -> ClientResult<ImportResult> {
        Ok(ImportResult {
            imported: strategies.len() as u32,
        })
    }
}

// ── fake feed ──────────────────────────────────────────────────────────

struct SocketHandle {
    inbound: Option<mpsc::UnboundedSender<String>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[derive(Default)]
struct ConnectorState {
    /// `true` opens a socket, `false` fails; an empty script fails
    script: VecDeque<bool>,
    attempts: Vec<Instant>,
    sockets: Vec<SocketHandle>,
}

#[derive(Clone, Default)]
struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl FakeConnector {
    fn scripted(outcomes: &[bool]) -> Self {
        let connector = Self::default();
        connector.state.lock().expect("lock").script = outcomes.iter().copied().collect();
        connector
    }

    fn attempts(&self) -> Vec<Instant> {
        self.state.lock().expect("lock").attempts.clone()
    }

    fn sent(&self, socket: usize) -> Vec<String> {
        self.state.lock().expect("lock").sockets[socket]
            .sent
            .lock()
            .expect("sent lock")
            .clone()
    }

    fn push(&self, socket: usize, frame: &str) {
        let state = self.state.lock().expect("lock");
        state.sockets[socket]
            .inbound
            .as_ref()
            .expect("socket open")
            .send(frame.to_string())
            .expect("socket reading");
    }

    /// Server-side close
    fn drop_socket(&self, socket: usize) {
        self.state.lock().expect("lock").sockets[socket].inbound = None;
    }

    fn is_closed(&self, socket: usize) -> bool {
        self.state.lock().expect("lock").sockets[socket]
            .closed
            .load(Ordering::SeqCst)
    }
}

struct FakeSocket {
    inbound: mpsc::UnboundedReceiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Socket for FakeSocket {
    async fn send_text(&mut self, text: String) -> ClientResult<()> {
        self.sent.lock().expect("sent lock").push(text);
        Ok(())
    }

    async fn recv_text(&mut self) -> Option<ClientResult<String>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Socket = FakeSocket;

    async fn connect(&self, _url: &Url) -> ClientResult<FakeSocket> {
        let mut state = self.state.lock().expect("lock");
        state.attempts.push(Instant::now());
        if !state.script.pop_front().unwrap_or(false) {
            return Err(ClientError::Http {
                status: 503,
                detail: Some("feed unavailable".into()),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        state.sockets.push(SocketHandle {
            inbound: Some(tx),
            sent: sent.clone(),
            closed: closed.clone(),
        });
        Ok(FakeSocket {
            inbound: rx,
            sent,
            closed,
        })
    }
}

// ── helpers ────────────────────────────────────────────────────────────

fn client_with(backend: Arc<FakeBackend>) -> LiveClient {
    let url = Url::parse("ws://localhost:8001/ws?token=test").expect("url");
    LiveClient::new(ClientSettings::new(url), backend)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn subscribe(index: &str, interval: u32) -> String {
    format!(r#"{{"type":"subscribe","index":"{index}","interval":{interval}}}"#)
}

fn gaps_secs(attempts: &[Instant]) -> Vec<u64> {
    attempts
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_secs())
        .collect()
}

// ── reconnect & backoff ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn backoff_doubles_from_floor_to_ceiling() {
    let connector = FakeConnector::scripted(&[]);
    let client = client_with(Arc::new(FakeBackend::default()));

    assert!(client.connect(connector.clone()).await);
    tokio::time::sleep(Duration::from_secs(100)).await;

    let attempts = connector.attempts();
    assert_eq!(gaps_secs(&attempts), vec![3, 6, 12, 24, 30]);
    let state = client.state().await;
    assert_eq!(state.connection, ConnectionState::Disconnected);
    assert_eq!(state.reconnect_attempts, 6);

    client.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_backoff() {
    let connector = FakeConnector::scripted(&[false, false, true]);
    let client = client_with(Arc::new(FakeBackend::default()));

    client.connect(connector.clone()).await;
    // attempts at 0s, 3s, then open at 9s
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(client.state().await.connection, ConnectionState::Connected);
    assert_eq!(client.state().await.reconnect_attempts, 0);

    let closed_at = Instant::now();
    connector.drop_socket(0);
    tokio::time::sleep(Duration::from_secs(20)).await;

    let attempts = connector.attempts();
    assert_eq!(gaps_secs(&attempts[..3]), vec![3, 6]);
    assert_eq!((attempts[3] - closed_at).as_secs(), 3);
    assert_eq!((attempts[4] - attempts[3]).as_secs(), 6);

    client.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn second_connect_is_a_no_op() {
    let connector = FakeConnector::scripted(&[true]);
    let client = client_with(Arc::new(FakeBackend::default()));

    assert!(client.connect(connector.clone()).await);
    settle().await;
    assert!(!client.connect(connector.clone()).await);
    settle().await;

    assert_eq!(connector.attempts().len(), 1);
    client.unmount().await;
}

// ── subscription ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn index_change_while_connected_resubscribes_once() {
    let backend = Arc::new(FakeBackend::default());
    let connector = FakeConnector::scripted(&[true]);
    let client = client_with(backend.clone());

    client.connect(connector.clone()).await;
    settle().await;
    assert_eq!(connector.sent(0), vec![subscribe("NIFTY", 5)]);

    connector.push(
        0,
        r#"{"type":"candle","data":{"open":1,"high":2,"low":0.5,"close":1.5,"ts":100}}"#,
    );
    settle().await;
    assert_eq!(client.state().await.candles.len(), 1);

    assert!(client.set_index("BANKNIFTY").await.is_some());
    settle().await;

    assert_eq!(
        connector.sent(0),
        vec![subscribe("NIFTY", 5), subscribe("BANKNIFTY", 5)]
    );
    assert!(client.state().await.candles.is_empty());
    client.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn selection_change_while_offline_waits_for_next_open() {
    let backend = Arc::new(FakeBackend::default());
    let connector = FakeConnector::scripted(&[false, true]);
    let client = client_with(backend.clone());

    client.connect(connector.clone()).await;
    settle().await;
    assert_eq!(client.state().await.connection, ConnectionState::Disconnected);

    assert!(client.set_candle_interval(60).await.is_some());
    assert!(client.set_index("SENSEX").await.is_some());

    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(connector.sent(0), vec![subscribe("SENSEX", 60)]);
    client.unmount().await;
}

// ── inbound frames ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn trade_closed_fetches_history_once() {
    let backend = Arc::new(FakeBackend::default());
    let connector = FakeConnector::scripted(&[true]);
    let client = client_with(backend.clone());

    client.connect(connector.clone()).await;
    settle().await;
    connector.push(0, r#"{"type":"trade_closed"}"#);
    settle().await;

    assert_eq!(FakeBackend::calls(&backend.trades_calls), 1);
    assert_eq!(client.state().await.trades.len(), 1);
    client.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn slow_trade_refetch_does_not_stall_the_feed() {
    let backend = Arc::new(FakeBackend {
        trades_delay: Some(Duration::from_secs(8)),
        ..Default::default()
    });
    let connector = FakeConnector::scripted(&[true]);
    let client = client_with(backend.clone());

    client.connect(connector.clone()).await;
    settle().await;
    connector.push(0, r#"{"type":"trade_closed"}"#);
    connector.push(0, r#"{"type":"tick","data":{"ltp":24000.0}}"#);
    settle().await;

    assert_eq!(FakeBackend::calls(&backend.trades_calls), 1);
    assert_eq!(client.state().await.market.ltp, 24000.0);

    let started = Instant::now();
    client.unmount().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(connector.is_closed(0));
    assert!(client.state().await.trades.is_empty());
}

#[tokio::test(start_paused = true)]
async fn state_sync_merges_and_bad_frames_keep_connection() {
    let connector = FakeConnector::scripted(&[true]);
    let client = client_with(Arc::new(FakeBackend::default()));

    client.connect(connector.clone()).await;
    settle().await;

    connector.push(0, "{not json");
    connector.push(
        0,
        r#"{"type":"state_update","data":{"is_running":true,"daily_pnl":850.5,
            "position":{"has_position":true,"option_type":"CE","strike":24150,
            "entry_price":100,"current_ltp":120,"qty":50}}}"#,
    );
    settle().await;

    let state = client.state().await;
    assert!(state.status.is_running);
    let position = state.position.expect("open position");
    assert_eq!(position.unrealized_pnl, 1000.0);

    connector.push(0, r#"{"type":"state_update","data":{"index_ltp":24210.0}}"#);
    settle().await;

    let state = client.state().await;
    assert!(state.position.is_none());
    assert!(state.status.is_running);
    assert_eq!(state.market.ltp, 24210.0);
    assert_eq!(connector.attempts().len(), 1);
    client.unmount().await;
}

// ── polling & lifecycle ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn polling_refreshes_without_a_socket() {
    let backend = Arc::new(FakeBackend::default());
    let client = client_with(backend.clone());

    client.mount(FakeConnector::scripted(&[])).await;
    tokio::time::sleep(Duration::from_millis(10_500)).await;

    // initial fetch + two poll rounds
    assert_eq!(FakeBackend::calls(&backend.logs_calls), 3);
    assert_eq!(FakeBackend::calls(&backend.status_calls), 3);
    client.unmount().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(FakeBackend::calls(&backend.logs_calls), 3);
}

#[tokio::test(start_paused = true)]
async fn unmount_during_backoff_stops_reconnecting() {
    let connector = FakeConnector::scripted(&[]);
    let client = client_with(Arc::new(FakeBackend::default()));

    client.connect(connector.clone()).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    client.unmount().await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(connector.attempts().len(), 1);
    assert_eq!(client.state().await.connection, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn unmount_closes_open_socket_and_silences_commands() {
    let connector = FakeConnector::scripted(&[true]);
    let client = client_with(Arc::new(FakeBackend::default()));
    let mut notes = client.notifications();

    client.connect(connector.clone()).await;
    settle().await;
    client.unmount().await;

    assert!(connector.is_closed(0));
    assert!(client.square_off().await.is_none());
    assert!(notes.try_recv().is_err());
    assert!(!client.connect(connector.clone()).await);
}

#[tokio::test]
async fn failed_command_reports_backend_detail() {
    let client = client_with(Arc::new(FakeBackend::default()));
    let mut notes = client.notifications();

    assert!(client.square_off().await.is_none());

    let note = notes.try_recv().expect("notification");
    assert_eq!(note.message, "Failed to square off: No open position");
}
