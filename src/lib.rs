//! NiftyAlgo client library
//!
//! Live-state client for the NiftyAlgo options trading bot: WebSocket feed
//! with reconnect/backoff, a partial-merge view-state store, REST command
//! functions and a polling fallback.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod feed;
pub mod notify;
pub mod store;
pub mod types;

pub use client::{ClientSettings, LiveClient};
pub use error::{ClientError, ClientResult};
