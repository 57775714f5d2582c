//! Socket seam
//!
//! The supervisor talks to a [`Socket`] obtained from a [`Connector`], so the
//! reconnect state machine can run against the real tokio-tungstenite stream
//! or an in-memory double.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// One open WebSocket connection
#[async_trait]
pub trait Socket: Send {
    async fn send_text(&mut self, text: String) -> ClientResult<()>;

    /// Next text frame. `None` once the peer has closed the connection.
    /// Must be cancel-safe: the supervisor races it against other events.
    async fn recv_text(&mut self) -> Option<ClientResult<String>>;

    async fn close(&mut self);
}

/// Opens sockets
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Socket: Socket + 'static;

    async fn connect(&self, url: &Url) -> ClientResult<Self::Socket>;
}

/// tokio-tungstenite connector
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Socket = WsSocket;

    async fn connect(&self, url: &Url) -> ClientResult<WsSocket> {
        debug!(url = %redact_token(url), "Opening feed WebSocket");
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                ClientError::WebSocket(tokio_tungstenite::tungstenite::Error::Io(
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                ))
            })??;
        Ok(WsSocket { stream })
    }
}

/// Live tokio-tungstenite connection
pub struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Socket for WsSocket {
    async fn send_text(&mut self, text: String) -> ClientResult<()> {
        self.stream.send(TungsteniteMessage::Text(text)).await?;
        Ok(())
    }

    async fn recv_text(&mut self) -> Option<ClientResult<String>> {
        // Pings are answered by tungstenite on the next read/write.
        loop {
            match self.stream.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => return Some(Ok(text)),
                Some(Ok(TungsteniteMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!("Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(TungsteniteMessage::Close(frame))) => {
                    info!(?frame, "Feed WebSocket closed by server");
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(Err(e.into())),
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "Close handshake failed");
        }
    }
}

/// URL with the auth token masked, for logs
pub fn redact_token(url: &Url) -> String {
    if !url.query_pairs().any(|(key, _)| key == "token") {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if key == "token" {
                "***".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
