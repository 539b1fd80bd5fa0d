//! Conversation messages and the ordered message log
//!
//! Messages serialise in the backend's wire form (`{"type", "content", "id"}`)
//! so the log can be replayed verbatim inside a submission payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value of the `type` field that marks message content as a choice list.
pub const SELECTION_MARKER: &str = "select";

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The person at the keyboard
    #[serde(rename = "human", alias = "user")]
    Human,
    /// The server-side agent
    #[serde(rename = "ai", alias = "agent", alias = "assistant")]
    Agent,
}

impl Role {
    /// Parses a backend message type, accepting chunk variants such as
    /// `AIMessageChunk`.
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "human" | "user" | "humanmessage" | "humanmessagechunk" => Some(Self::Human),
            "ai" | "agent" | "assistant" | "aimessage" | "aimessagechunk" => Some(Self::Agent),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// Message body: plain text or a structured payload that needs interpretation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain prose (possibly markdown)
    Text(String),
    /// Any other JSON shape, e.g. a list of content parts
    Structured(Value),
}

impl MessageContent {
    /// Returns true when there is nothing to show.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Structured(Value::Null) => true,
            Self::Structured(Value::Array(parts)) => parts.is_empty(),
            Self::Structured(_) => false,
        }
    }

    /// Flattens the content into displayable text.
    ///
    /// Content-part arrays contribute their `text` fields; other structured
    /// values are rendered as compact JSON.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(Value::String(text)) => text.clone(),
            Self::Structured(Value::Array(parts)) => parts
                .iter()
                .map(|part| match part {
                    Value::String(text) => text.clone(),
                    other => other
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect(),
            Self::Structured(other) => other.to_string(),
        }
    }

    /// Appends an incremental chunk received from the stream.
    pub fn append(&mut self, delta: &MessageContent) {
        match (&mut *self, delta) {
            (Self::Text(current), Self::Text(more)) => current.push_str(more),
            (Self::Structured(Value::Array(current)), Self::Structured(Value::Array(more))) => {
                current.extend(more.iter().cloned())
            }
            (current, more) => {
                let mut text = current.as_text();
                text.push_str(&more.as_text());
                *current = Self::Text(text);
            }
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A single entry in the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier, unique within the log
    pub id: String,
    /// Author of the message
    #[serde(rename = "type")]
    pub role: Role,
    /// Message body
    pub content: MessageContent,
    /// Local creation time; not part of the wire form
    #[serde(skip, default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a human message with a freshly generated id.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentdesk::session::message::{Message, Role};
    ///
    /// let msg = Message::human("hello");
    /// assert_eq!(msg.role, Role::Human);
    /// assert!(!msg.id.is_empty());
    /// ```
    pub fn human(content: impl Into<MessageContent>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Human,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Creates an agent message with the id announced by the stream.
    pub fn agent(id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            id: id.into(),
            role: Role::Agent,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Interprets the content as a structured selection request.
    pub fn selection_prompt(&self) -> Option<SelectionPrompt> {
        match self.role {
            Role::Agent => SelectionPrompt::from_content(&self.content),
            Role::Human => None,
        }
    }
}

/// A choice list embedded in an agent message's content
///
/// The backend sometimes answers with `{"type": "select", "topics": [...]}`
/// instead of prose; such messages render as a choice list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPrompt {
    /// Choices offered to the user, in backend order
    pub choices: Vec<String>,
    /// The parsed payload the choices came from
    pub raw: Value,
}

impl SelectionPrompt {
    /// Parses message content, returning `None` for anything that is not a
    /// non-empty selection request.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentdesk::session::message::{MessageContent, SelectionPrompt};
    ///
    /// let content = MessageContent::from(r#"{"type":"select","topics":["A","B"]}"#);
    /// let prompt = SelectionPrompt::from_content(&content).unwrap();
    /// assert_eq!(prompt.choices, vec!["A", "B"]);
    ///
    /// assert!(SelectionPrompt::from_content(&MessageContent::from("plain prose")).is_none());
    /// ```
    pub fn from_content(content: &MessageContent) -> Option<Self> {
        let value = match content {
            MessageContent::Text(text) => serde_json::from_str::<Value>(text.trim()).ok()?,
            MessageContent::Structured(value) => value.clone(),
        };

        if value.get("type").and_then(Value::as_str) != Some(SELECTION_MARKER) {
            return None;
        }

        let choices: Vec<String> = value
            .get("topics")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();

        if choices.is_empty() {
            tracing::debug!("selection payload carried no usable choices");
            return None;
        }

        Some(Self {
            choices,
            raw: value,
        })
    }
}

/// Ordered conversation log; insertion order is the canonical order
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message at the end of the log.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Removes the most recent message.
    pub(crate) fn pop(&mut self) -> Option<Message> {
        self.messages.pop()
    }

    /// Looks up a message by id.
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Mutable lookup by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Returns true if a message with this id is already logged.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// All messages in insertion order.
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// Iterator over messages in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Number of logged messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
