//! Inbound frame handling
//!
//! Every frame is decoded independently. Malformed frames are logged and
//! dropped; they never take the connection down. Nothing here waits on
//! the network: REST refetches are queued for the refresh worker.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::protocol::ServerMessage;
use crate::client::{RefreshRequests, TRADE_CLOSED};
use crate::notify::Notifier;
use crate::store::Store;

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<Store>,
    refresh_tx: RefreshRequests,
    notifier: Notifier,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, refresh_tx: RefreshRequests, notifier: Notifier) -> Self {
        Self {
            store,
            refresh_tx,
            notifier,
        }
    }

    /// Decode and apply one text frame
    pub async fn dispatch(&self, text: &str) {
        match ServerMessage::parse(text) {
            Ok(Some(message)) => self.apply(message).await,
            Ok(None) => debug!("Feed frame without a handled type"),
            Err(e) => warn!(error = %e, bytes = text.len(), "Dropping malformed feed frame"),
        }
    }

    pub async fn apply(&self, message: ServerMessage) {
        match message {
            ServerMessage::Tick(tick) => {
                self.store.update(|s| s.apply_tick(&tick)).await;
            }
            ServerMessage::Candle(candle) => {
                self.store.update(|s| s.push_candle(&candle)).await;
            }
            ServerMessage::StateUpdate(snapshot) => {
                self.store.update(move |s| s.merge_snapshot(snapshot)).await;
            }
            ServerMessage::DailyStopTriggered(alert) => {
                let text = alert.alert_text();
                warn!(
                    daily_pnl = alert.daily_pnl,
                    daily_max_loss = alert.daily_max_loss,
                    "Daily stop triggered"
                );
                let applied = self.store.update(|s| s.apply_daily_stop(&alert)).await;
                if applied.is_some() {
                    self.notifier.warning(text);
                }
            }
            ServerMessage::TradeClosed => {
                info!("Trade closed, refreshing history");
                if self.refresh_tx.send(TRADE_CLOSED).is_err() {
                    debug!("Refresh worker gone; trade history refresh dropped");
                }
            }
            ServerMessage::Heartbeat => debug!("Feed heartbeat"),
            ServerMessage::Ack(ack) => {
                debug!(status = ?ack.status, index = ?ack.index, interval = ?ack.interval, "Subscription acknowledged");
            }
            ServerMessage::Error(message) => warn!(%message, "Feed reported an error"),
        }
    }
}
