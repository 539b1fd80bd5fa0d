//! Activity event aggregation
//!
//! Progress notices emitted by the backend while an agent turn is produced
//! are classified against [`RECOGNIZED_UPDATES`] and buffered. The live
//! buffer belongs to the exchange currently streaming; on finalization it
//! moves, unchanged, into the historical map under the agent message id.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use super::Payload;

/// One row of the recognized-update vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognizedUpdate {
    /// Top-level field of the update that identifies the event
    pub field: &'static str,
    /// Title shown to the user
    pub title: &'static str,
    /// Key inside the field's object holding the event data
    pub data_key: Option<&'static str>,
}

/// Update field carrying generated topics; also starts the selection handshake.
pub const TOPICS_FIELD: &str = "generate_topic";

/// Recognized update fields, checked in order; the first match wins.
pub const RECOGNIZED_UPDATES: &[RecognizedUpdate] = &[
    RecognizedUpdate {
        field: "save_state",
        title: "state saved",
        data_key: None,
    },
    RecognizedUpdate {
        field: "save_conversation_state",
        title: "state saved",
        data_key: None,
    },
    RecognizedUpdate {
        field: "generate_title",
        title: "titles generated",
        data_key: Some("titles"),
    },
    RecognizedUpdate {
        field: "generate_article",
        title: "article generated",
        data_key: Some("article"),
    },
    RecognizedUpdate {
        field: "analyze_subtitle",
        title: "summary generated",
        data_key: Some("viewpoints"),
    },
    RecognizedUpdate {
        field: TOPICS_FIELD,
        title: "topics generated",
        data_key: Some("topics"),
    },
    RecognizedUpdate {
        field: "generate_outline",
        title: "outline generated",
        data_key: Some("outline"),
    },
    RecognizedUpdate {
        field: "generate_storyboard",
        title: "storyboard generated",
        data_key: Some("storyBoard"),
    },
    RecognizedUpdate {
        field: "batch_generate_image",
        title: "images generated",
        data_key: Some("images"),
    },
];

/// A single progress notice attached to an agent message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEvent {
    /// Human-readable title, e.g. "titles generated"
    pub title: String,
    /// Opaque payload extracted from the update
    pub data: Value,
}

/// JavaScript-style truthiness, matching how the backend signals presence.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Finds the first recognized field present in `update`.
pub fn recognize(update: &Payload) -> Option<&'static RecognizedUpdate> {
    RECOGNIZED_UPDATES
        .iter()
        .find(|entry| update.get(entry.field).map(is_truthy).unwrap_or(false))
}

/// Classifies an update into an activity event.
///
/// Returns `None` for updates that carry no recognized field.
///
/// # Examples
///
/// ```
/// use agentdesk::session::activity::classify;
/// use serde_json::json;
///
/// let update = json!({"save_state": true});
/// let event = classify(update.as_object().unwrap()).unwrap();
/// assert_eq!(event.title, "state saved");
/// assert_eq!(event.data, json!(""));
/// ```
pub fn classify(update: &Payload) -> Option<ActivityEvent> {
    let entry = recognize(update)?;
    let data = entry
        .data_key
        .and_then(|key| update.get(entry.field)?.get(key).cloned())
        .unwrap_or_else(|| Value::String(String::new()));

    Some(ActivityEvent {
        title: entry.title.to_string(),
        data,
    })
}

/// Which activity buffer the view layer should show for a message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivityView<'a> {
    /// The message is still streaming; show the live buffer
    Live(&'a [ActivityEvent]),
    /// The message is complete; show what was recorded for it
    Historical(&'a [ActivityEvent]),
    /// Nothing to show
    Empty,
}

/// Collects live activity and keeps the per-message history
#[derive(Debug, Clone, Default)]
pub struct ActivityAggregator {
    live: Vec<ActivityEvent>,
    historical: HashMap<String, Vec<ActivityEvent>>,
}

impl ActivityAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `update` and appends it to the live buffer.
    ///
    /// Unrecognized updates are ignored and return `None`.
    pub fn record(&mut self, update: &Payload) -> Option<&ActivityEvent> {
        let event = classify(update)?;
        tracing::debug!(title = %event.title, "activity recorded");
        self.live.push(event);
        self.live.last()
    }

    /// Moves the live buffer into history under `message_id` and clears it.
    ///
    /// History is write-once: if `message_id` already has an entry it is
    /// kept and the live buffer is discarded. With no message id the live
    /// buffer is simply cleared. Returns the number of events archived.
    pub fn finalize(&mut self, message_id: Option<&str>) -> usize {
        let events = std::mem::take(&mut self.live);
        let Some(id) = message_id else {
            if !events.is_empty() {
                tracing::debug!(
                    count = events.len(),
                    "no agent message to attach activity to"
                );
            }
            return 0;
        };

        if self.historical.contains_key(id) {
            tracing::warn!(message_id = %id, "activity history already recorded; keeping original");
            return 0;
        }

        let count = events.len();
        self.historical.insert(id.to_string(), events);
        count
    }

    /// Events belonging to the exchange in flight.
    pub fn live(&self) -> &[ActivityEvent] {
        &self.live
    }

    /// Events recorded for a completed message.
    pub fn historical(&self, message_id: &str) -> Option<&[ActivityEvent]> {
        self.historical.get(message_id).map(Vec::as_slice)
    }

    /// Selects the buffer to render for `message_id`; never both.
    pub fn view_for(&self, message_id: &str, streaming: bool) -> ActivityView<'_> {
        if streaming {
            return ActivityView::Live(&self.live);
        }
        match self.historical(message_id) {
            Some(events) if !events.is_empty() => ActivityView::Historical(events),
            _ => ActivityView::Empty,
        }
    }
}
