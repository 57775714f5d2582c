//! Holder cell for the current instrument/interval selection
//!
//! The feed supervisor reads it when it sends `subscribe`, so a reconnect
//! always subscribes to whatever was selected last.
//!
//! Every change bumps a generation counter. A backend read that started
//! before a local change carries an older generation and must not undo it.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

use crate::types::Selection;

#[derive(Debug)]
pub struct SelectionCell {
    tx: watch::Sender<Selection>,
    generation: AtomicU64,
}

impl SelectionCell {
    pub fn new(initial: Selection) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            tx,
            generation: AtomicU64::new(0),
        }
    }

    /// Current selection
    pub fn get(&self) -> Selection {
        self.tx.borrow().clone()
    }

    /// Number of changes so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Replace the selection; returns true when it changed
    pub fn set(&self, selection: Selection) -> bool {
        self.replace(selection, None)
    }

    /// Replace the selection only if nothing changed it after generation
    /// `seen` was read
    pub fn set_since(&self, selection: Selection, seen: u64) -> bool {
        self.replace(selection, Some(seen))
    }

    fn replace(&self, selection: Selection, seen: Option<u64>) -> bool {
        // The watch lock serializes the check with concurrent changes
        self.tx.send_if_modified(|current| {
            let stale = seen.is_some_and(|seen| seen != self.generation());
            if stale || *current == selection {
                return false;
            }
            *current = selection;
            self.generation.fetch_add(1, Ordering::AcqRel);
            true
        })
    }

    /// Receiver notified on every change
    pub fn watch(&self) -> watch::Receiver<Selection> {
        self.tx.subscribe()
    }
}
