//! Console channel: wire types, the `ConsoleApi` seam, and the reconnecting
//! client that feeds inbound messages to the orchestrator.

mod backoff;
mod client;
mod http;
mod poll;
mod sse;

pub use backoff::{Backoff, BackoffPolicy};
pub use client::{BridgeEvent, ChannelClient};
pub use http::HttpConsole;
pub use poll::{PollCursor, PollStream, SharedCursor};
pub use sse::{SseDecoder, SseEvent};

use serde::{Deserialize, Deserializer, Serialize};

/// A message as emitted by the Console. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "senderId")]
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, rename = "content", alias = "text")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    pub fn new(id: &str, sender_id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            sender_id: sender_id.to_string(),
            sender_name: None,
            text: text.to_string(),
            timestamp: None,
        }
    }
}

/// Console ids arrive as strings or integers depending on the endpoint.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Who the bridge posts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub name: String,
}

/// Body of an outbound post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub sender_type: &'static str,
    pub content: String,
    pub message_type: &'static str,
}

impl OutboundMessage {
    pub fn response(identity: &Identity, content: &str) -> Self {
        Self::with_type(identity, content, "response")
    }

    pub fn status(identity: &Identity, content: &str) -> Self {
        Self::with_type(identity, content, "status")
    }

    fn with_type(identity: &Identity, content: &str, message_type: &'static str) -> Self {
        Self {
            sender_id: identity.id.clone(),
            sender_name: identity.name.clone(),
            sender_type: "agent",
            content: content.to_string(),
            message_type,
        }
    }
}

/// An entry of the Console's online list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Entity {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("console request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("console sent malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("console unavailable: {0}")]
    Unavailable(String),
}

/// Inbound messages in Console order. `None` means the server closed the
/// stream; an `Err` item means the connection broke.
pub type InboundStream = Box<dyn Iterator<Item = Result<ChatMessage, TransportError>>>;

/// Everything the bridge consumes from the Console.
pub trait ConsoleApi: Send + Sync {
    /// Open the long-lived inbound subscription.
    fn open_stream(&self) -> Result<InboundStream, TransportError>;

    /// Post one message to the channel.
    fn post(&self, message: &OutboundMessage) -> Result<(), TransportError>;

    /// Entities currently online.
    fn online_entities(&self) -> Result<Vec<Entity>, TransportError>;

    /// The last `limit` channel messages, oldest first.
    fn recent_messages(&self, limit: usize) -> Result<Vec<ChatMessage>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_accepts_console_field_names() {
        let json = r#"{"id": 42, "sender_id": "alice", "sender_name": "Alice", "content": "@copilot help", "timestamp": "2026-01-02T03:04:05Z"}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "42");
        assert_eq!(msg.sender_id, "alice");
        assert_eq!(msg.text, "@copilot help");
        assert_eq!(msg.sender_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn chat_message_accepts_camel_case_and_text() {
        let json = r#"{"id": "m-1", "senderId": "bob", "text": "hello"}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "m-1");
        assert_eq!(msg.sender_id, "bob");
        assert_eq!(msg.text, "hello");
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn chat_message_tolerates_missing_fields() {
        let msg: ChatMessage = serde_json::from_str("{}").unwrap();
        assert_eq!(msg.id, "");
        assert_eq!(msg.text, "");
    }

    #[test]
    fn outbound_message_serializes_sender_identity() {
        let identity = Identity {
            id: "copilot-bridge".into(),
            name: "Copilot".into(),
        };
        let body = serde_json::to_value(OutboundMessage::response(&identity, "hi")).unwrap();
        assert_eq!(body["sender_id"], "copilot-bridge");
        assert_eq!(body["sender_name"], "Copilot");
        assert_eq!(body["sender_type"], "agent");
        assert_eq!(body["content"], "hi");
        assert_eq!(body["message_type"], "response");
    }
}
