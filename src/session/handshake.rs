//! Selection handshake
//!
//! The backend can pause a turn to ask the user for a discrete choice. Two
//! independent signals start the handshake: a `generate_topic` update on the
//! stream, and a completed agent message whose content is a
//! `{"type": "select", ...}` payload. Both produce a [`SelectionRequest`]
//! that the session holds until the user resolves it.

use serde_json::Value;

use super::activity::{is_truthy, TOPICS_FIELD};
use super::message::Message;
use super::Payload;
use crate::error::{AgentDeskError, Result};

/// Where a pending selection came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionSource {
    /// A `generate_topic` update received while streaming
    TopicsUpdate,
    /// A completed agent message carrying a choice list
    Message {
        /// Id of the message that rendered as a choice list
        message_id: String,
    },
}

/// A choice the backend is waiting for
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRequest {
    /// Choices to offer, in backend order
    pub choices: Vec<String>,
    /// Payload needed to continue the paused turn, if the backend sent one
    pub resume_context: Option<Payload>,
    /// Detection point that raised the request
    pub source: SelectionSource,
    /// True once the user closed the choice list without choosing
    pub dismissed: bool,
}

impl SelectionRequest {
    /// Resolves a 1-based menu index to its choice.
    pub fn choice_at(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.choices.get(i))
            .map(String::as_str)
    }
}

/// Detects a topics update and captures its payload as resume context.
///
/// # Examples
///
/// ```
/// use agentdesk::session::handshake::detect_in_update;
/// use serde_json::json;
///
/// let update = json!({"generate_topic": {"topics": ["A", "B"]}});
/// let request = detect_in_update(update.as_object().unwrap()).unwrap();
/// assert_eq!(request.choices, vec!["A", "B"]);
/// assert!(request.resume_context.is_some());
/// ```
pub fn detect_in_update(update: &Payload) -> Option<SelectionRequest> {
    let value = update.get(TOPICS_FIELD).filter(|v| is_truthy(v))?;

    let context = value.as_object().cloned().unwrap_or_default();
    let choices = context
        .get("topics")
        .and_then(Value::as_array)
        .map(|topics| {
            topics
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(SelectionRequest {
        choices,
        resume_context: Some(context),
        source: SelectionSource::TopicsUpdate,
        dismissed: false,
    })
}

/// Detects a choice list in a completed agent message.
///
/// The strategy's cached resume context, when present, is what the choice
/// continues; otherwise the choice is submitted as a fresh turn.
pub fn detect_in_message(
    message: &Message,
    cached_context: Option<&Payload>,
) -> Option<SelectionRequest> {
    let prompt = message.selection_prompt()?;
    Some(SelectionRequest {
        choices: prompt.choices,
        resume_context: cached_context.cloned(),
        source: SelectionSource::Message {
            message_id: message.id.clone(),
        },
        dismissed: false,
    })
}

/// Normalizes the user's choice.
///
/// # Errors
///
/// Returns [`AgentDeskError::Validation`] for an empty choice.
pub fn normalize_choice(request: &SelectionRequest, choice: &str) -> Result<String> {
    let choice = choice.trim();
    if choice.is_empty() {
        return Err(AgentDeskError::Validation("a choice must not be empty".to_string()).into());
    }
    if !request.choices.is_empty() && !request.choices.iter().any(|c| c == choice) {
        tracing::debug!(choice = %choice, "choice is not one of the offered options");
    }
    Ok(choice.to_string())
}
