//! Connection supervisor
//!
//! ```text
//!   disconnected --connect()--> connecting --open--> connected
//!        ^                          |                    |
//!        +----- backoff sleep <-----+---- close/error ---+
//! ```
//!
//! At most one socket is open at a time. Every open sends `subscribe` with
//! the selection current at that moment, and resets the backoff.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

use super::backoff::Backoff;
use super::dispatch::Dispatcher;
use super::protocol::ClientMessage;
use super::shutdown_requested;
use super::socket::{redact_token, Connector, Socket};
use crate::error::ClientResult;
use crate::store::{SelectionCell, Store};
use crate::types::ConnectionState;

enum SessionEnd {
    Shutdown,
    Lost(String),
}

pub struct Supervisor<C: Connector> {
    connector: C,
    url: Url,
    store: Arc<Store>,
    selection: Arc<SelectionCell>,
    dispatcher: Dispatcher,
    resubscribe_rx: mpsc::UnboundedReceiver<()>,
    shutdown_rx: watch::Receiver<bool>,
    backoff: Backoff,
}

impl<C: Connector> Supervisor<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connector: C,
        url: Url,
        store: Arc<Store>,
        selection: Arc<SelectionCell>,
        dispatcher: Dispatcher,
        resubscribe_rx: mpsc::UnboundedReceiver<()>,
        shutdown_rx: watch::Receiver<bool>,
        backoff: Backoff,
    ) -> Self {
        Self {
            connector,
            url,
            store,
            selection,
            dispatcher,
            resubscribe_rx,
            shutdown_rx,
            backoff,
        }
    }

    /// Connect, stream, back off, repeat until shutdown
    pub async fn run(mut self) {
        info!(url = %redact_token(&self.url), "Feed supervisor started");

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            self.store.set_connection(ConnectionState::Connecting).await;

            let connected = tokio::select! {
                result = self.connector.connect(&self.url) => result,
                _ = shutdown_requested(&mut self.shutdown_rx) => break,
            };

            match connected {
                Ok(socket) => match self.session(socket).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Lost(reason) => warn!(%reason, "Feed connection lost"),
                },
                Err(e) => warn!(error = %e, "Feed connection failed"),
            }

            let delay = self.backoff.next_delay();
            self.store.note_retry(delay).await;
            info!(
                attempt = self.backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting feed after backoff"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut self.shutdown_rx) => break,
            }
        }

        self.store
            .set_connection(ConnectionState::Disconnected)
            .await;
        info!("Feed supervisor stopped");
    }

    async fn session(&mut self, mut socket: C::Socket) -> SessionEnd {
        self.backoff.reset();
        self.store.set_connection(ConnectionState::Connected).await;
        info!("Feed connected");

        // The open subscribe carries the latest selection already
        while self.resubscribe_rx.try_recv().is_ok() {}

        if let Err(e) = self.subscribe(&mut socket).await {
            socket.close().await;
            return SessionEnd::Lost(format!("subscribe failed: {e}"));
        }

        loop {
            tokio::select! {
                frame = socket.recv_text() => match frame {
                    Some(Ok(text)) => self.dispatcher.dispatch(&text).await,
                    Some(Err(e)) => {
                        socket.close().await;
                        return SessionEnd::Lost(e.to_string());
                    }
                    None => return SessionEnd::Lost("closed by server".to_string()),
                },
                request = self.resubscribe_rx.recv() => match request {
                    Some(()) => {
                        if let Err(e) = self.subscribe(&mut socket).await {
                            socket.close().await;
                            return SessionEnd::Lost(format!("subscribe failed: {e}"));
                        }
                    }
                    None => {
                        debug!("Resubscribe channel closed");
                        socket.close().await;
                        return SessionEnd::Shutdown;
                    }
                },
                _ = shutdown_requested(&mut self.shutdown_rx) => {
                    socket.close().await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    async fn subscribe(&self, socket: &mut C::Socket) -> ClientResult<()> {
        let selection = self.selection.get();
        let frame = ClientMessage::Subscribe {
            index: selection.index.clone(),
            interval: selection.interval_secs,
        }
        .to_text()?;
        socket.send_text(frame).await?;
        info!(%selection, "Subscribed to feed");
        Ok(())
    }
}
