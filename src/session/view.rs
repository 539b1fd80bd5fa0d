//! Transcript view
//!
//! Turns the session into the entries a front end draws: each message with
//! the body it should render as, and the one activity buffer that belongs
//! next to it.

use super::activity::ActivityView;
use super::message::{Message, Role};
use super::ConversationSession;

/// How a message body should be drawn
#[derive(Debug, Clone, PartialEq)]
pub enum EntryBody {
    /// Prose, possibly markdown
    Markdown(String),
    /// A completed agent message that parsed as a choice list
    Choices(Vec<String>),
}

/// One rendered row of the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry<'a> {
    /// The underlying message
    pub message: &'a Message,
    /// What to draw for it
    pub body: EntryBody,
    /// Activity shown with it
    pub activity: ActivityView<'a>,
    /// True while the message is still receiving content
    pub streaming: bool,
}

impl ConversationSession {
    /// Builds the transcript in log order.
    ///
    /// Choice lists are only recognized once a message is complete; while
    /// streaming its text is shown as-is.
    pub fn transcript(&self) -> Vec<TranscriptEntry<'_>> {
        let streaming_id = self.streaming_message_id();
        self.messages()
            .iter()
            .map(|message| {
                let streaming = streaming_id == Some(message.id.as_str());
                let body = match message.selection_prompt() {
                    Some(prompt) if !streaming => EntryBody::Choices(prompt.choices),
                    _ => EntryBody::Markdown(message.content.as_text()),
                };
                let activity = match message.role {
                    Role::Agent => self.activity_for(&message.id),
                    Role::Human => ActivityView::Empty,
                };
                TranscriptEntry {
                    message,
                    body,
                    activity,
                    streaming,
                }
            })
            .collect()
    }
}
