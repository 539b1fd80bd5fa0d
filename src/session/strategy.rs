//! Submission strategies and the per-agent registry
//!
//! Each agent expects a structurally different request body. A
//! [`SubmissionStrategy`] owns that shape for one agent identifier; the
//! [`StrategyRegistry`] maps identifiers to strategies so new agents can be
//! added without touching the session state machine.

use std::collections::HashMap;

use serde_json::Value;

use super::activity::TOPICS_FIELD;
use super::message::Message;
use super::Payload;
use crate::error::{AgentDeskError, Result};

/// Identifier of the article-from-subtitles agent.
pub const CONTENT_AGENT: &str = "contentAgent";
/// Identifier of the topic-then-article agent.
pub const XIAOHONGSHU_AGENT: &str = "xiaohongshuAgent";
/// Identifier of the comic generation agent.
pub const COMICS_AGENT: &str = "comicsAgent";

/// Payload field carrying the user's chosen topic.
pub const SELECTED_TOPIC_FIELD: &str = "selected_topic";

/// Input collected from the user for one submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInput {
    /// Free text typed by the user (may be empty)
    pub content: String,
    /// Selected reference document filename, if any
    pub srt: Option<String>,
}

impl UserInput {
    /// Creates input carrying only text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            srt: None,
        }
    }

    /// Attaches a reference document filename.
    pub fn with_srt(mut self, srt: impl Into<String>) -> Self {
        self.srt = Some(srt.into());
        self
    }

    /// Returns true if the input should appear in the message log.
    pub fn has_visible_content(&self) -> bool {
        !self.content.trim().is_empty()
    }

    fn srt_value(&self) -> Value {
        Value::String(self.srt.clone().unwrap_or_default())
    }
}

/// Shapes outbound payloads for one agent
///
/// # Examples
///
/// ```
/// use agentdesk::session::strategy::{SubmissionStrategy, UserInput};
/// use agentdesk::session::message::Message;
/// use agentdesk::session::Payload;
/// use agentdesk::error::Result;
///
/// #[derive(Debug)]
/// struct EchoStrategy;
///
/// impl SubmissionStrategy for EchoStrategy {
///     fn agent_id(&self) -> &str {
///         "echoAgent"
///     }
///
///     fn shape(&mut self, _history: &[Message], input: &UserInput) -> Result<Payload> {
///         let mut payload = Payload::new();
///         payload.insert("text".to_string(), input.content.clone().into());
///         Ok(payload)
///     }
/// }
/// ```
pub trait SubmissionStrategy: Send + Sync + std::fmt::Debug {
    /// Agent identifier this strategy serves
    fn agent_id(&self) -> &str;

    /// Builds the payload for a new submission.
    ///
    /// `history` is the running message log, already including the human
    /// message for this submission when it carries visible content.
    fn shape(&mut self, history: &[Message], input: &UserInput) -> Result<Payload>;

    /// Builds the payload that continues a turn paused for a selection.
    ///
    /// The default overlays the chosen value onto `context`.
    fn resume(&mut self, history: &[Message], context: Payload, input: &UserInput) -> Result<Payload> {
        let _ = history;
        Ok(merge_selection(context, &input.content))
    }

    /// Observes every update event of the agent's exchanges.
    fn on_update_event(&mut self, update: &Payload) {
        let _ = update;
    }

    /// Cached resume context from a paused turn, if any.
    fn resume_context(&self) -> Option<&Payload> {
        None
    }

    /// Drops any cross-turn state.
    fn reset(&mut self) {}
}

/// Overlays the chosen topic onto a resume context.
pub fn merge_selection(mut context: Payload, choice: &str) -> Payload {
    context.insert(
        SELECTED_TOPIC_FIELD.to_string(),
        Value::String(choice.to_string()),
    );
    context
}

fn history_value(history: &[Message]) -> Result<Value> {
    Ok(serde_json::to_value(history)?)
}

fn insert_empty(payload: &mut Payload, fields: &[&str]) {
    for field in fields {
        payload.insert((*field).to_string(), Value::String(String::new()));
    }
}

/// Article-from-subtitles agent: replays the log with empty narrative fields
#[derive(Debug, Default)]
pub struct ContentStrategy;

impl SubmissionStrategy for ContentStrategy {
    fn agent_id(&self) -> &str {
        CONTENT_AGENT
    }

    fn shape(&mut self, history: &[Message], input: &UserInput) -> Result<Payload> {
        let mut payload = Payload::new();
        payload.insert("messages".to_string(), history_value(history)?);
        insert_empty(
            &mut payload,
            &[
                "subtitle_text",
                "core_topic",
                "viewpoints",
                "article",
                "titles",
                "warnings",
                "review_result",
                "comment",
            ],
        );
        payload.insert("srt".to_string(), input.srt_value());
        Ok(payload)
    }
}

/// Topic-then-article agent
///
/// The backend pauses after generating topics. The `generate_topic` update
/// is cached so the next submission continues that turn instead of starting
/// a new one.
#[derive(Debug, Default)]
pub struct XiaohongshuStrategy {
    cached: Option<Payload>,
}

impl SubmissionStrategy for XiaohongshuStrategy {
    fn agent_id(&self) -> &str {
        XIAOHONGSHU_AGENT
    }

    fn shape(&mut self, history: &[Message], input: &UserInput) -> Result<Payload> {
        if let Some(context) = self.cached.take() {
            tracing::debug!("continuing paused turn from cached topics");
            return Ok(merge_selection(context, &input.content));
        }

        let mut payload = Payload::new();
        payload.insert("messages".to_string(), history_value(history)?);
        insert_empty(&mut payload, &["subtitle_text"]);
        payload.insert(
            SELECTED_TOPIC_FIELD.to_string(),
            Value::String(input.content.clone()),
        );
        insert_empty(
            &mut payload,
            &[
                "viewpoints",
                "article",
                "titles",
                "warnings",
                "review_result",
                "comment",
            ],
        );
        payload.insert("srt".to_string(), input.srt_value());
        Ok(payload)
    }

    fn resume(&mut self, _history: &[Message], context: Payload, input: &UserInput) -> Result<Payload> {
        self.cached = None;
        Ok(merge_selection(context, &input.content))
    }

    fn on_update_event(&mut self, update: &Payload) {
        if let Some(Value::Object(topics)) = update.get(TOPICS_FIELD) {
            self.cached = Some(topics.clone());
        }
    }

    fn resume_context(&self) -> Option<&Payload> {
        self.cached.as_ref()
    }

    fn reset(&mut self) {
        self.cached = None;
    }
}

/// Comic agent: single-shot description
#[derive(Debug, Default)]
pub struct ComicsStrategy;

impl SubmissionStrategy for ComicsStrategy {
    fn agent_id(&self) -> &str {
        COMICS_AGENT
    }

    fn shape(&mut self, history: &[Message], input: &UserInput) -> Result<Payload> {
        let mut payload = Payload::new();
        payload.insert("messages".to_string(), history_value(history)?);
        payload.insert(
            "description".to_string(),
            Value::String(input.content.clone()),
        );
        insert_empty(&mut payload, &["outline"]);
        Ok(payload)
    }
}

/// Maps agent identifiers to their submission strategies
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Box<dyn SubmissionStrategy>>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in agents.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentdesk::session::strategy::StrategyRegistry;
    ///
    /// let registry = StrategyRegistry::with_builtin();
    /// assert!(registry.contains("contentAgent"));
    /// assert!(!registry.contains("ghost"));
    /// ```
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ContentStrategy));
        registry.register(Box::new(XiaohongshuStrategy::default()));
        registry.register(Box::new(ComicsStrategy));
        registry
    }

    /// Registers a strategy under its agent id, returning any it replaced.
    pub fn register(
        &mut self,
        strategy: Box<dyn SubmissionStrategy>,
    ) -> Option<Box<dyn SubmissionStrategy>> {
        let id = strategy.agent_id().to_string();
        tracing::debug!(agent = %id, "registering submission strategy");
        self.strategies.insert(id, strategy)
    }

    /// Returns true if a strategy exists for `agent_id`.
    pub fn contains(&self, agent_id: &str) -> bool {
        self.strategies.contains_key(agent_id)
    }

    /// Looks up the strategy for `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDeskError::Configuration`] for unknown identifiers.
    pub fn get_mut(&mut self, agent_id: &str) -> Result<&mut dyn SubmissionStrategy> {
        match self.strategies.get_mut(agent_id) {
            Some(strategy) => Ok(strategy.as_mut()),
            None => Err(AgentDeskError::Configuration(format!(
                "no submission strategy registered for agent '{}'",
                agent_id
            ))
            .into()),
        }
    }

    /// Registered agent identifiers, sorted.
    pub fn agent_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Clears cross-turn state of every strategy.
    pub fn reset_all(&mut self) {
        for strategy in self.strategies.values_mut() {
            strategy.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;
    use serde_json::json;

    fn obj(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_content_payload_with_empty_history() {
        let mut strategy = ContentStrategy;
        let payload = strategy
            .shape(&[], &UserInput::text("").with_srt("lecture1.srt"))
            .unwrap();

        assert_eq!(payload["messages"], json!([]));
        assert_eq!(payload["srt"], json!("lecture1.srt"));
        for field in [
            "subtitle_text",
            "core_topic",
            "viewpoints",
            "article",
            "titles",
            "warnings",
            "review_result",
            "comment",
        ] {
            assert_eq!(payload[field], json!(""), "field {field} should be empty");
        }
    }

    #[test]
    fn test_content_payload_replays_history() {
        let mut strategy = ContentStrategy;
        let history = vec![Message::agent("a1", "earlier answer")];
        let payload = strategy.shape(&history, &UserInput::text("")).unwrap();
        assert_eq!(payload["messages"][0]["type"], json!("ai"));
        assert_eq!(payload["srt"], json!(""));
    }

    #[test]
    fn test_xiaohongshu_fresh_payload_carries_topic_from_content() {
        let mut strategy = XiaohongshuStrategy::default();
        let history = vec![Message::human("spring outfits")];
        let payload = strategy
            .shape(&history, &UserInput::text("spring outfits"))
            .unwrap();
        assert_eq!(payload[SELECTED_TOPIC_FIELD], json!("spring outfits"));
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
        assert!(!payload.contains_key("core_topic"));
    }

    #[test]
    fn test_xiaohongshu_caches_topic_update() {
        let mut strategy = XiaohongshuStrategy::default();
        strategy.on_update_event(&obj(json!({"generate_topic": {"topics": ["A", "B"]}})));
        assert_eq!(
            strategy.resume_context(),
            Some(&obj(json!({"topics": ["A", "B"]})))
        );
    }

    #[test]
    fn test_xiaohongshu_shape_uses_cache_once() {
        let mut strategy = XiaohongshuStrategy::default();
        strategy.on_update_event(&obj(json!({"generate_topic": {"topics": ["A", "B"]}})));

        let resumed = strategy.shape(&[], &UserInput::text("A")).unwrap();
        assert_eq!(
            resumed,
            obj(json!({"topics": ["A", "B"], "selected_topic": "A"}))
        );
        assert!(strategy.resume_context().is_none());

        let fresh = strategy.shape(&[], &UserInput::text("other")).unwrap();
        assert!(fresh.contains_key("messages"));
        assert!(!fresh.contains_key("topics"));
    }

    #[test]
    fn test_xiaohongshu_resume_clears_cache() {
        let mut strategy = XiaohongshuStrategy::default();
        strategy.on_update_event(&obj(json!({"generate_topic": {"topics": ["A", "B"]}})));
        let context = strategy.resume_context().cloned().unwrap();

        let payload = strategy
            .resume(&[], context, &UserInput::text("B"))
            .unwrap();
        assert_eq!(payload["selected_topic"], json!("B"));
        assert!(strategy.resume_context().is_none());
    }

    #[test]
    fn test_comics_payload_is_single_shot_description() {
        let mut strategy = ComicsStrategy;
        let payload = strategy
            .shape(&[], &UserInput::text("a cat on the moon"))
            .unwrap();
        assert_eq!(
            payload,
            obj(json!({"messages": [], "description": "a cat on the moon", "outline": ""}))
        );
    }

    #[test]
    fn test_default_resume_merges_choice() {
        let mut strategy = ComicsStrategy;
        let payload = strategy
            .resume(&[], obj(json!({"topics": ["x"]})), &UserInput::text("x"))
            .unwrap();
        assert_eq!(payload, obj(json!({"topics": ["x"], "selected_topic": "x"})));
    }

    #[test]
    fn test_registry_unknown_agent_is_configuration_error() {
        let mut registry = StrategyRegistry::with_builtin();
        let err = registry.get_mut("ghost").unwrap_err();
        assert!(matches!(
            kind_of(&err),
            Some(AgentDeskError::Configuration(_))
        ));
    }

    #[test]
    fn test_registry_accepts_new_strategies() {
        #[derive(Debug)]
        struct Novel;
        impl SubmissionStrategy for Novel {
            fn agent_id(&self) -> &str {
                "service"
            }
            fn shape(&mut self, _history: &[Message], input: &UserInput) -> Result<Payload> {
                Ok(obj(json!({"outline": input.content})))
            }
        }

        let mut registry = StrategyRegistry::with_builtin();
        assert!(registry.register(Box::new(Novel)).is_none());
        assert_eq!(
            registry.agent_ids(),
            vec!["comicsAgent", "contentAgent", "service", "xiaohongshuAgent"]
        );
        let payload = registry
            .get_mut("service")
            .unwrap()
            .shape(&[], &UserInput::text("plot"))
            .unwrap();
        assert_eq!(payload["outline"], json!("plot"));
    }

    #[test]
    fn test_registry_reset_all_drops_cached_context() {
        let mut registry = StrategyRegistry::with_builtin();
        registry
            .get_mut(XIAOHONGSHU_AGENT)
            .unwrap()
            .on_update_event(&obj(json!({"generate_topic": {"topics": ["A"]}})));
        registry.reset_all();
        assert!(registry
            .get_mut(XIAOHONGSHU_AGENT)
            .unwrap()
            .resume_context()
            .is_none());
    }
}
