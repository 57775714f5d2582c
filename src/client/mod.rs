//! Live-state client
//!
//! Owns the store, the feed supervisor and the polling fallback, and
//! exposes the dashboard's command functions (see `commands.rs`).

mod commands;
mod refresh;

pub use refresh::{RefreshRequests, Refresher, Slice, TRADE_CLOSED};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::api::BackendApi;
use crate::feed::{Backoff, Connector, Dispatcher, Subscription, Supervisor};
use crate::notify::{Notification, Notifier};
use crate::store::{SelectionCell, Store, ViewState};
use crate::types::Selection;

/// Runtime knobs of a [`LiveClient`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Feed endpoint including the auth token, if any
    pub ws_url: Url,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
    pub poll_interval: Duration,
    pub candle_history_limit: usize,
    pub log_tail_limit: u32,
    /// Used until the backend reports its own selection
    pub initial_selection: Selection,
}

impl ClientSettings {
    pub fn new(ws_url: Url) -> Self {
        Self {
            ws_url,
            backoff_floor: Duration::from_secs(3),
            backoff_ceiling: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            candle_history_limit: 200,
            log_tail_limit: 100,
            initial_selection: Selection::new("NIFTY", 5),
        }
    }
}

pub struct LiveClient {
    settings: ClientSettings,
    store: Arc<Store>,
    api: Arc<dyn BackendApi>,
    notifier: Notifier,
    selection: Arc<SelectionCell>,
    subscription: Subscription,
    refresher: Refresher,
    /// Taken by the one supervisor this client ever starts
    resubscribe_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    shutdown_tx: watch::Sender<bool>,
    polling: Mutex<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LiveClient {
    pub fn new(settings: ClientSettings, api: Arc<dyn BackendApi>) -> Self {
        let store = Arc::new(Store::new(settings.candle_history_limit));
        let selection = Arc::new(SelectionCell::new(settings.initial_selection.clone()));
        let (resubscribe_tx, resubscribe_rx) = mpsc::unbounded_channel();
        let subscription = Subscription::new(store.clone(), selection.clone(), resubscribe_tx);
        let refresher = Refresher::new(
            store.clone(),
            api.clone(),
            subscription.clone(),
            settings.log_tail_limit,
        );
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            settings,
            store,
            api,
            notifier: Notifier::default(),
            selection,
            subscription,
            refresher,
            resubscribe_rx: Mutex::new(Some(resubscribe_rx)),
            shutdown_tx,
            polling: Mutex::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    /// Owned copy of the view-state
    pub async fn state(&self) -> ViewState {
        self.store.snapshot().await
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn selection(&self) -> Selection {
        self.selection.get()
    }

    pub fn refresher(&self) -> &Refresher {
        &self.refresher
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Initial fetch, then the feed and the polling fallback
    pub async fn mount<C: Connector>(&self, connector: C) {
        self.refresher.initial_fetch().await;
        self.connect(connector).await;
        self.start_polling().await;
    }

    /// Start the feed supervisor.
    ///
    /// No-op (returns false) if a connection is already open or being
    /// opened, or after unmount. The supervisor keeps reconnecting on its
    /// own, so one call per client is all that is ever needed.
    pub async fn connect<C: Connector>(&self, connector: C) -> bool {
        if *self.shutdown_tx.borrow() {
            debug!("Connect after unmount ignored");
            return false;
        }

        let mut slot = self.resubscribe_rx.lock().await;
        if slot.is_none() {
            debug!("Feed supervisor already running");
            return false;
        }
        if !self.store.begin_connecting().await {
            debug!("Connection already open or opening");
            return false;
        }
        let Some(resubscribe_rx) = slot.take() else {
            return false;
        };

        // Frames never wait on REST; refetches run on their own task
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let worker = self
            .refresher
            .clone()
            .run_requests(refresh_rx, self.shutdown_tx.subscribe());

        let dispatcher = Dispatcher::new(self.store.clone(), refresh_tx, self.notifier.clone());
        let supervisor = Supervisor::new(
            connector,
            self.settings.ws_url.clone(),
            self.store.clone(),
            self.selection.clone(),
            dispatcher,
            resubscribe_rx,
            self.shutdown_tx.subscribe(),
            Backoff::new(self.settings.backoff_floor, self.settings.backoff_ceiling),
        );

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(worker));
        tasks.push(tokio::spawn(supervisor.run()));
        true
    }

    /// Start the fixed-interval refresh of logs, trades, status and
    /// summary. Idempotent.
    pub async fn start_polling(&self) -> bool {
        let mut polling = self.polling.lock().await;
        if *polling || *self.shutdown_tx.borrow() {
            return false;
        }
        *polling = true;

        let poller = self
            .refresher
            .clone()
            .run_poller(self.settings.poll_interval, self.shutdown_tx.subscribe());
        self.tasks.lock().await.push(tokio::spawn(poller));
        true
    }

    /// Stop every background task and close the socket. Results arriving
    /// afterwards are discarded.
    pub async fn unmount(&self) {
        self.store.unmount();
        self.shutdown_tx.send_replace(true);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                debug!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Client unmounted");
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
