//! REST-backed refreshes of individual view-state slices, plus the
//! fixed-interval polling fallback.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::BackendApi;
use crate::error::ClientResult;
use crate::feed::{shutdown_requested, Subscription};
use crate::store::{Store, ViewState};

/// Slices refreshable on their own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slice {
    Status,
    Position,
    Trades,
    Summary,
    Analytics,
    Logs,
    Config,
    Indices,
    Timeframes,
    Strategies,
}

impl Slice {
    pub fn name(&self) -> &'static str {
        match self {
            Slice::Status => "status",
            Slice::Position => "position",
            Slice::Trades => "trades",
            Slice::Summary => "summary",
            Slice::Analytics => "analytics",
            Slice::Logs => "logs",
            Slice::Config => "config",
            Slice::Indices => "indices",
            Slice::Timeframes => "timeframes",
            Slice::Strategies => "strategies",
        }
    }
}

/// Everything fetched when the client mounts
const INITIAL: [Slice; 9] = [
    Slice::Status,
    Slice::Position,
    Slice::Trades,
    Slice::Summary,
    Slice::Analytics,
    Slice::Logs,
    Slice::Config,
    Slice::Indices,
    Slice::Timeframes,
];

/// What the poller keeps fresh in case the push channel is down
const POLLED: [Slice; 4] = [Slice::Logs, Slice::Trades, Slice::Status, Slice::Summary];

/// Refetched when the feed reports a closed trade
pub const TRADE_CLOSED: &[Slice] = &[Slice::Trades, Slice::Analytics];

/// Refresh requests handed from the feed to [`Refresher::run_requests`]
pub type RefreshRequests = mpsc::UnboundedSender<&'static [Slice]>;

#[derive(Clone)]
pub struct Refresher {
    store: Arc<Store>,
    api: Arc<dyn BackendApi>,
    subscription: Subscription,
    log_limit: u32,
}

impl Refresher {
    pub fn new(
        store: Arc<Store>,
        api: Arc<dyn BackendApi>,
        subscription: Subscription,
        log_limit: u32,
    ) -> Self {
        Self {
            store,
            api,
            subscription,
            log_limit,
        }
    }

    async fn apply<T, F>(&self, fetched: ClientResult<T>, write: F) -> ClientResult<()>
    where
        F: FnOnce(&mut ViewState, T),
    {
        let value = fetched?;
        self.store.update(move |s| write(s, value)).await;
        Ok(())
    }

    /// Bot status. A selection reported by the backend becomes the feed
    /// selection, so a reconnect never reverts another dashboard's change.
    /// A reply older than a local selection change is not adopted.
    pub async fn status(&self) -> ClientResult<()> {
        let seen = self.subscription.generation();
        let status = self.api.status().await?;
        let selection = self
            .store
            .update(move |s| {
                s.status = status;
                s.selection()
            })
            .await;
        if let Some(selection) = selection {
            self.subscription.adopt(selection, seen).await;
        }
        Ok(())
    }

    pub async fn position(&self) -> ClientResult<()> {
        self.apply(self.api.position().await, |s, v| s.apply_position(v))
            .await
    }

    pub async fn trades(&self) -> ClientResult<()> {
        self.apply(self.api.trades(None).await, |s, v| s.trades = v)
            .await
    }

    pub async fn summary(&self) -> ClientResult<()> {
        self.apply(self.api.summary().await, |s, v| s.summary = v)
            .await
    }

    pub async fn analytics(&self) -> ClientResult<()> {
        self.apply(self.api.analytics().await, |s, v| s.analytics = v)
            .await
    }

    pub async fn logs(&self) -> ClientResult<()> {
        self.apply(self.api.logs(self.log_limit, None).await, |s, v| s.logs = v)
            .await
    }

    pub async fn config(&self) -> ClientResult<()> {
        self.apply(self.api.config().await, |s, v| s.config = v)
            .await
    }

    pub async fn indices(&self) -> ClientResult<()> {
        self.apply(self.api.indices().await, |s, v| s.indices = v)
            .await
    }

    pub async fn timeframes(&self) -> ClientResult<()> {
        self.apply(self.api.timeframes().await, |s, v| s.timeframes = v)
            .await
    }

    pub async fn strategies(&self) -> ClientResult<()> {
        self.apply(self.api.list_strategies().await, |s, v| s.strategies = v)
            .await
    }

    pub async fn slice(&self, slice: Slice) -> ClientResult<()> {
        match slice {
            Slice::Status => self.status().await,
            Slice::Position => self.position().await,
            Slice::Trades => self.trades().await,
            Slice::Summary => self.summary().await,
            Slice::Analytics => self.analytics().await,
            Slice::Logs => self.logs().await,
            Slice::Config => self.config().await,
            Slice::Indices => self.indices().await,
            Slice::Timeframes => self.timeframes().await,
            Slice::Strategies => self.strategies().await,
        }
    }

    /// Refresh `slices` concurrently; returns the number of failures
    async fn many(&self, slices: &[Slice], loud: bool) -> usize {
        let results =
            futures_util::future::join_all(slices.iter().map(|slice| self.slice(*slice))).await;

        let mut failed = 0;
        for (slice, result) in slices.iter().zip(results) {
            if let Err(e) = result {
                failed += 1;
                if loud {
                    warn!(slice = slice.name(), error = %e, "Refresh failed");
                } else {
                    debug!(slice = slice.name(), error = %e, "Refresh failed");
                }
            }
        }
        failed
    }

    /// Fetch every slice once. Failures leave defaults in place.
    pub async fn initial_fetch(&self) -> usize {
        let failed = self.many(&INITIAL, true).await;
        info!(
            fetched = INITIAL.len() - failed,
            failed, "Initial state fetched"
        );
        failed
    }

    /// Follow-up refresh after a command; failures are not surfaced
    pub async fn after_command(&self, slices: &[Slice]) {
        self.many(slices, false).await;
    }

    pub async fn poll_once(&self) -> usize {
        self.many(&POLLED, false).await
    }

    /// Serve refresh requests from the feed until shutdown or until every
    /// sender is gone. A refresh still in flight at shutdown is abandoned.
    pub async fn run_requests(
        self,
        mut requests: mpsc::UnboundedReceiver<&'static [Slice]>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            let slices = tokio::select! {
                request = requests.recv() => match request {
                    Some(slices) => slices,
                    None => break,
                },
                _ = shutdown_requested(&mut shutdown_rx) => break,
            };

            tokio::select! {
                failed = self.many(slices, true) => {
                    if failed > 0 {
                        debug!(failed, "Requested refresh incomplete");
                    }
                }
                _ = shutdown_requested(&mut shutdown_rx) => break,
            }
        }
        debug!("Refresh worker stopped");
    }

    /// Poll until shutdown. The first round runs one period after start.
    pub async fn run_poller(self, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(period_ms = period.as_millis() as u64, "Polling started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let failed = self.poll_once().await;
                    if failed > 0 {
                        debug!(failed, "Poll round incomplete");
                    }
                }
                _ = shutdown_requested(&mut shutdown_rx) => break,
            }
        }
        info!("Polling stopped");
    }
}
