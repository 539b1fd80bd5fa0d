//! Streaming channel abstraction and implementations
//!
//! The streaming channel carries one submission payload to the backend and
//! delivers the resulting incremental events back, tagged with the
//! [`ExchangeId`] they belong to. Concrete implementations live in
//! submodules:
//!
//! - [`http::HttpStreamChannel`] -- runs agents over HTTP with a
//!   server-sent-events response.
//! - [`fake::FakeChannel`] -- in-process fake that records payloads and lets
//!   tests inject events.
//!
//! Connection handling and retries belong to the implementation; the
//! session only sees [`ChannelEvent`]s.

use std::pin::Pin;

use futures::Stream;
use serde_json::Value;

use crate::error::Result;
use crate::session::message::{MessageContent, Role};
use crate::session::Payload;

pub mod fake;
pub mod http;

/// Identifies one submit → stream → finalize cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(pub u64);

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exchange-{}", self.0)
    }
}

/// One incremental update from the backend
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The backend accepted the run
    Acknowledged {
        /// Backend run identifier, when reported
        run_id: Option<String>,
    },
    /// A chunk of message content
    MessageDelta {
        /// Message id announced by the backend
        id: Option<String>,
        /// Author of the message
        role: Role,
        /// Content to append
        content: MessageContent,
    },
    /// A custom update (`node name -> state fragment`)
    Update(Payload),
    /// Transport or backend failure with a human-readable message
    Error(String),
    /// The run finished normally
    Finished,
    /// Anything the channel could not interpret
    Unclassified(String),
}

impl StreamEvent {
    /// Classifies a raw server-sent event.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentdesk::channel::StreamEvent;
    ///
    /// let event = StreamEvent::from_sse(Some("updates"), r#"{"save_state": true}"#);
    /// assert!(matches!(event, StreamEvent::Update(_)));
    ///
    /// let event = StreamEvent::from_sse(Some("end"), "");
    /// assert_eq!(event, StreamEvent::Finished);
    /// ```
    pub fn from_sse(event: Option<&str>, data: &str) -> Self {
        let name = event.unwrap_or("message");
        match name {
            "end" => Self::Finished,
            "metadata" => {
                let run_id = serde_json::from_str::<Value>(data)
                    .ok()
                    .and_then(|v| v.get("run_id").and_then(Value::as_str).map(str::to_string));
                Self::Acknowledged { run_id }
            }
            "updates" => match serde_json::from_str::<Value>(data) {
                Ok(Value::Object(update)) => Self::Update(update),
                _ => Self::Unclassified(format!("{}: {}", name, data)),
            },
            "error" => Self::Error(error_message(data)),
            _ if name == "messages" || name.starts_with("messages/") => {
                Self::message_delta(data).unwrap_or_else(|| Self::Unclassified(format!("{}: {}", name, data)))
            }
            _ => Self::Unclassified(format!("{}: {}", name, data)),
        }
    }

    /// Parses a `[chunk, metadata]` tuple (or a bare chunk) into a delta.
    fn message_delta(data: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(data).ok()?;
        let chunk = match &value {
            Value::Array(items) => items.first()?,
            Value::Object(_) => &value,
            _ => return None,
        };

        let role = chunk
            .get("type")
            .and_then(Value::as_str)
            .and_then(Role::from_wire)?;
        let content = match chunk.get("content") {
            Some(Value::String(text)) => MessageContent::Text(text.clone()),
            Some(other) => MessageContent::Structured(other.clone()),
            None => MessageContent::default(),
        };
        let id = chunk.get("id").and_then(Value::as_str).map(str::to_string);

        Some(Self::MessageDelta { id, role, content })
    }
}

fn error_message(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(value) => value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        Err(_) if data.is_empty() => "stream reported an error".to_string(),
        Err(_) => data.to_string(),
    }
}

/// A [`StreamEvent`] tagged with its exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    /// Exchange the event belongs to
    pub exchange: ExchangeId,
    /// The event itself
    pub event: StreamEvent,
}

impl ChannelEvent {
    /// Tags `event` with `exchange`.
    pub fn new(exchange: ExchangeId, event: StreamEvent) -> Self {
        Self { exchange, event }
    }
}

/// Abstraction over streaming backends.
///
/// Used polymorphically through `Arc<dyn StreamingChannel>` so the session
/// can be driven by HTTP in production and by [`fake::FakeChannel`] in
/// tests.
#[async_trait::async_trait]
pub trait StreamingChannel: Send + Sync + std::fmt::Debug {
    /// Starts a run of `agent_id` with `payload` for `exchange`.
    ///
    /// Returning `Ok` means the run was handed off; later failures arrive as
    /// [`StreamEvent::Error`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AgentDeskError::Channel`] if the run could
    /// not be started at all.
    async fn submit(&self, exchange: ExchangeId, agent_id: &str, payload: Payload) -> Result<()>;

    /// Asks the backend to stop emitting events for `exchange`.
    ///
    /// Cooperative: events already buffered may still be delivered.
    async fn stop(&self, exchange: ExchangeId);

    /// Stream of events for every exchange, in arrival order.
    fn events(&self) -> Pin<Box<dyn Stream<Item = ChannelEvent> + Send + '_>>;
}
