//! Live feed
//!
//! One WebSocket connection to the backend, kept alive by [`Supervisor`]:
//! - `subscribe` with the current selection on every open
//! - exponential backoff between attempts (floor 3s, ceiling 30s by default)
//! - inbound frames folded into the store by [`Dispatcher`]

pub mod backoff;
pub mod dispatch;
pub mod protocol;
pub mod socket;
pub mod subscription;
pub mod supervisor;

pub use backoff::Backoff;
pub use dispatch::Dispatcher;
pub use protocol::{ClientMessage, ServerMessage};
pub use socket::{Connector, Socket, WsConnector, WsSocket};
pub use subscription::Subscription;
pub use supervisor::Supervisor;

use tokio::sync::watch;

/// Resolves once shutdown has been signalled or the signalling side is gone
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
