//! Client error type
//!
//! Every failure a command function can hit collapses into `ClientError`,
//! which knows how to render itself as a user-facing notification.

use thiserror::Error;

/// Errors raised by the REST backend, the WebSocket feed and the wire codec
#[derive(Debug, Error)]
pub enum ClientError {
    /// Non-2xx HTTP response; `detail` is the backend-provided message when present
    #[error("backend returned {status}: {}", detail.as_deref().unwrap_or("no detail"))]
    Http { status: u16, detail: Option<String> },

    /// 2xx response whose body reports `"status": "error"`
    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Shorthand for results carrying [`ClientError`]
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Message shown to the user in a notification.
    ///
    /// Prefers the backend's own explanation and falls back to a generic
    /// line when the backend gave none.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Http {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => detail.clone(),
            ClientError::Http { status, .. } => format!("Request failed (HTTP {status})"),
            ClientError::Rejected(message) if !message.trim().is_empty() => message.clone(),
            ClientError::Rejected(_) => "Request rejected by backend".to_string(),
            ClientError::Transport(_) => "Backend unreachable".to_string(),
            ClientError::Decode(_) => "Unexpected response from backend".to_string(),
            ClientError::WebSocket(_) => "Live connection error".to_string(),
            ClientError::Url(_) => "Invalid backend address".to_string(),
        }
    }

    /// True when the failure was reported by the backend rather than the network
    pub fn is_backend_reported(&self) -> bool {
        matches!(self, ClientError::Http { .. } | ClientError::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_prefers_backend_detail() {
        let err = ClientError::Http {
            status: 400,
            detail: Some("Stop the bot before applying a strategy".to_string()),
        };
        assert_eq!(
            err.user_message(),
            "Stop the bot before applying a strategy"
        );
        assert!(err.is_backend_reported());
    }

    #[test]
    fn http_error_without_detail_falls_back() {
        let err = ClientError::Http {
            status: 502,
            detail: None,
        };
        assert_eq!(err.user_message(), "Request failed (HTTP 502)");

        let blank = ClientError::Http {
            status: 500,
            detail: Some("   ".to_string()),
        };
        assert_eq!(blank.user_message(), "Request failed (HTTP 500)");
    }

    #[test]
    fn rejected_body_surfaces_message() {
        let err = ClientError::Rejected("Cannot change mode with open position".to_string());
        assert_eq!(err.user_message(), "Cannot change mode with open position");

        let decode = ClientError::from(serde_json::from_str::<u32>("x").unwrap_err());
        assert_eq!(decode.user_message(), "Unexpected response from backend");
        assert!(!decode.is_backend_reported());
    }
}
