use std::fmt::{Display, Formatter};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Close code the peer (or we) use for a deliberate, clean shutdown.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// The unit of both inbound and outbound traffic on the realtime socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    /// Epoch milliseconds at the time the envelope was built.
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Heartbeat frame; carries no payload.
    pub fn ping() -> Self {
        Self::new("ping", Value::Null)
    }

    pub fn from_json(raw: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("envelope fields always serialize")
    }

    /// The recognized message type, if any.
    pub fn event_kind(&self) -> Option<EventKind> {
        EventKind::parse(&self.kind)
    }
}

/// Message types the dashboard reacts to on the inbound path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    WhatsappStatus,
    QrUpdate,
    NewMessage,
    MessageStatus,
    WhatsappConnected,
    WhatsappDisconnected,
    Pong,
}

impl EventKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "connected" => Some(Self::Connected),
            "whatsapp_status" => Some(Self::WhatsappStatus),
            "qr_update" => Some(Self::QrUpdate),
            "new_message" => Some(Self::NewMessage),
            "message_status" => Some(Self::MessageStatus),
            "whatsapp_connected" => Some(Self::WhatsappConnected),
            "whatsapp_disconnected" => Some(Self::WhatsappDisconnected),
            "pong" => Some(Self::Pong),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::WhatsappStatus => "whatsapp_status",
            Self::QrUpdate => "qr_update",
            Self::NewMessage => "new_message",
            Self::MessageStatus => "message_status",
            Self::WhatsappConnected => "whatsapp_connected",
            Self::WhatsappDisconnected => "whatsapp_disconnected",
            Self::Pong => "pong",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a socket went away, as seen by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// A close with no code at all, e.g. a dropped TCP stream.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(None, reason)
    }

    /// Clean closes suppress reconnection; everything else triggers it.
    pub fn is_clean(&self) -> bool {
        self.code == Some(NORMAL_CLOSE_CODE)
    }
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "close {} ({})", code, self.reason),
            None => write!(f, "close ({})", self.reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{CloseReason, Envelope, EventKind};

    #[test]
    fn test_parsing_inbound_envelope() {
        let raw = r#"{"type":"new_message","data":{"from":"+4915112345678"},"timestamp":1718000000000}"#;
        let envelope = Envelope::from_json(raw).unwrap();

        assert_eq!(envelope.kind, "new_message");
        assert_eq!(envelope.event_kind(), Some(EventKind::NewMessage));
        assert_eq!(envelope.data["from"], "+4915112345678");
        assert_eq!(envelope.timestamp, 1_718_000_000_000);
    }

    #[test]
    fn test_missing_data_defaults_to_null() {
        let raw = r#"{"type":"pong","timestamp":1}"#;
        let envelope = Envelope::from_json(raw).unwrap();

        assert_eq!(envelope.event_kind(), Some(EventKind::Pong));
        assert!(envelope.data.is_null());
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(Envelope::from_json("{not json").is_err());
        assert!(Envelope::from_json(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn test_round_trip_keeps_the_type_field_name() {
        let envelope = Envelope::new("message_status", json!({"id": "abc", "status": "read"}));
        let raw = envelope.to_json();

        assert!(raw.contains(r#""type":"message_status""#));
        assert_eq!(Envelope::from_json(&raw).unwrap(), envelope);
    }

    #[test]
    fn test_ping_shape() {
        let ping = Envelope::ping();

        assert_eq!(ping.kind, "ping");
        assert!(ping.data.is_null());
        assert!(ping.timestamp > 0);
    }

    #[test]
    fn test_unrecognized_kind() {
        let envelope = Envelope::new("server_gossip", serde_json::Value::Null);
        assert_eq!(envelope.event_kind(), None);
    }

    #[test]
    fn test_clean_close_is_code_1000_only() {
        assert!(CloseReason::new(Some(1000), "bye").is_clean());
        assert!(!CloseReason::new(Some(1006), "dropped").is_clean());
        assert!(!CloseReason::abnormal("EOF").is_clean());
    }
}
