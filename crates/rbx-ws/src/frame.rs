//! Wire frame types for the realtime endpoint.
//!
//! Outgoing frames carry an `action`; incoming frames are an envelope of
//! `channel`, `event`, `data` and an optional `sequence`. The `subscribed`
//! ack doubles as the initial snapshot: its `data` is the full state of the
//! channel at subscription time.

use rbx_core::Topic;
use serde::{Deserialize, Serialize};

/// Channel name used for authentication acks.
pub const AUTH_CHANNEL: &str = "auth";

/// Outgoing frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientFrame {
    Auth { token: String },
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

impl ClientFrame {
    pub fn auth(token: impl Into<String>) -> Self {
        Self::Auth {
            token: token.into(),
        }
    }

    pub fn subscribe(topic: &Topic) -> Self {
        Self::Subscribe {
            channel: topic.channel(),
        }
    }

    pub fn unsubscribe(topic: &Topic) -> Self {
        Self::Unsubscribe {
            channel: topic.channel(),
        }
    }
}

/// Incoming event discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Subscribed,
    Unsubscribed,
    Update,
    Error,
}

/// Incoming frame envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    pub channel: String,
    pub event: Event,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl ServerFrame {
    /// Parse the channel name into a typed topic.
    pub fn topic(&self) -> Result<Topic, rbx_core::CoreError> {
        self.channel.parse()
    }

    pub fn is_auth(&self) -> bool {
        self.channel == AUTH_CHANNEL
    }

    /// Human-readable reason carried by `error` events.
    pub fn error_reason(&self) -> &str {
        self.data
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("unspecified")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_frame_serialization() {
        let frame = ClientFrame::subscribe(&Topic::orderbook("BTC-USD"));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({"action": "subscribe", "channel": "orderbook:BTC-USD"})
        );

        let auth = serde_json::to_value(ClientFrame::auth("tok")).unwrap();
        assert_eq!(auth, json!({"action": "auth", "token": "tok"}));
    }

    #[test]
    fn test_server_frame_update_with_sequence() {
        let frame: ServerFrame = serde_json::from_value(json!({
            "channel": "orderbook:BTC-USD",
            "event": "update",
            "data": {"bids": [["100", "5"]], "asks": []},
            "sequence": 42
        }))
        .unwrap();

        assert_eq!(frame.event, Event::Update);
        assert_eq!(frame.sequence, Some(42));
        assert_eq!(frame.topic().unwrap(), Topic::orderbook("BTC-USD"));
    }

    #[test]
    fn test_server_frame_without_data() {
        let frame: ServerFrame = serde_json::from_value(json!({
            "channel": "auth",
            "event": "subscribed"
        }))
        .unwrap();

        assert!(frame.is_auth());
        assert!(frame.data.is_null());
        assert!(frame.sequence.is_none());
    }

    #[test]
    fn test_error_reason() {
        let frame: ServerFrame = serde_json::from_value(json!({
            "channel": "orderbook:NOPE-USD",
            "event": "error",
            "data": {"reason": "unknown market"}
        }))
        .unwrap();
        assert_eq!(frame.error_reason(), "unknown market");

        let bare: ServerFrame = serde_json::from_value(json!({
            "channel": "orderbook:NOPE-USD",
            "event": "error"
        }))
        .unwrap();
        assert_eq!(bare.error_reason(), "unspecified");
    }
}
