//! Selection changes and resubscription
//!
//! A new instrument or interval invalidates the candle cache. The
//! supervisor is asked to resend `subscribe` only while the socket is open;
//! otherwise the next open picks the selection up from the cell.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::store::{SelectionCell, Store};
use crate::types::{ConnectionState, Selection};

#[derive(Debug, Clone)]
pub struct Subscription {
    store: Arc<Store>,
    selection: Arc<SelectionCell>,
    resubscribe_tx: mpsc::UnboundedSender<()>,
}

impl Subscription {
    pub fn new(
        store: Arc<Store>,
        selection: Arc<SelectionCell>,
        resubscribe_tx: mpsc::UnboundedSender<()>,
    ) -> Self {
        Self {
            store,
            selection,
            resubscribe_tx,
        }
    }

    pub fn current(&self) -> Selection {
        self.selection.get()
    }

    /// Generation to hand to [`Subscription::adopt`]
    pub fn generation(&self) -> u64 {
        self.selection.generation()
    }

    /// Store `next` as the selection. Returns false if it was already current.
    pub async fn change(&self, next: Selection) -> bool {
        let changed = self.selection.set(next.clone());
        self.after_change(changed, next).await
    }

    /// Take over a selection read from the backend, unless the selection
    /// changed locally after generation `seen`
    pub async fn adopt(&self, next: Selection, seen: u64) -> bool {
        let changed = self.selection.set_since(next.clone(), seen);
        if !changed && self.selection.generation() != seen {
            debug!(selection = %next, "Ignoring backend selection older than a local change");
        }
        self.after_change(changed, next).await
    }

    async fn after_change(&self, changed: bool, next: Selection) -> bool {
        if !changed {
            return false;
        }

        self.store.update(|s| s.candles.clear()).await;

        if self.store.connection().await == ConnectionState::Connected {
            info!(selection = %next, "Selection changed, resubscribing");
            if self.resubscribe_tx.send(()).is_err() {
                debug!("Feed supervisor gone; resubscribe dropped");
            }
        } else {
            debug!(selection = %next, "Selection changed while offline; next open subscribes");
        }
        true
    }

    pub async fn change_index(&self, index: &str) -> bool {
        let interval = self.selection.get().interval_secs;
        self.change(Selection::new(index, interval)).await
    }

    pub async fn change_interval(&self, interval_secs: u32) -> bool {
        let index = self.selection.get().index;
        self.change(Selection::new(index, interval_secs)).await
    }
}
