//! Realtime connection error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    /// Token rejected by the venue. Fatal: retrying with the same token
    /// cannot succeed.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("authentication timed out after {0:?}")]
    AuthTimeout(Duration),

    /// The token source (Transport) failed to produce a session token.
    /// Retryable through the reconnect loop.
    #[error("token source error: {0}")]
    TokenSource(String),

    #[error("subscription rejected on {channel}: {reason}")]
    Subscription { channel: String, reason: String },

    #[error("sequence gap on {channel}: expected {expected}, got {got}")]
    SequenceGap {
        channel: String,
        expected: u64,
        got: u64,
    },

    #[error("heartbeat timed out")]
    HeartbeatTimeout,

    #[error("reconnect budget exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("client already started")]
    AlreadyStarted,

    #[error("WebSocket error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Fatal errors terminate the session instead of entering the
    /// reconnect loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthRejected(_) | Self::RetriesExhausted { .. } | Self::AlreadyStarted
        )
    }
}

pub type WsResult<T> = Result<T, WsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(WsError::AuthRejected("bad token".into()).is_fatal());
        assert!(WsError::RetriesExhausted { attempts: 5 }.is_fatal());
        assert!(!WsError::HeartbeatTimeout.is_fatal());
        assert!(!WsError::TokenSource("timeout".into()).is_fatal());
        assert!(!WsError::ConnectTimeout(Duration::from_secs(10)).is_fatal());
    }
}
