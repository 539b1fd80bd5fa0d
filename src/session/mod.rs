//! Conversation session orchestration
//!
//! [`ConversationSession`] owns one conversation with one agent: the ordered
//! message log, the activity aggregator, the strategy registry and the
//! current [`SessionPhase`]. User actions (`submit`, `resolve_selection`,
//! `cancel`) shape and hand payloads to a [`StreamingChannel`]; the event
//! pump feeds the channel's events back through
//! [`ConversationSession::on_event`].
//!
//! # Phases
//!
//! ```text
//! Idle ──submit──> Submitting ──ack/first event──> Streaming ──finished──> Idle
//!   ^                  │                              │  │
//!   │               channel error               error │  │ topics / choice list
//!   │                  v                              v  v
//!   └─cancel──────  Failed <───────────────────────────  AwaitingSelection
//!                                                         │
//!                                      resolve_selection ─┘──> Submitting
//! ```
//!
//! Only one exchange is open at a time. Events tagged with any other
//! exchange, including one that was cancelled, are discarded.

pub mod activity;
pub mod handshake;
pub mod message;
pub mod pump;
pub mod strategy;
pub mod view;

use std::sync::Arc;

use serde_json::Value;

use crate::channel::{ExchangeId, StreamEvent, StreamingChannel};
use crate::error::{kind_of, AgentDeskError, Result};
use activity::{ActivityAggregator, ActivityEvent, ActivityView};
use handshake::{detect_in_message, detect_in_update, normalize_choice, SelectionRequest};
use message::{Message, MessageContent, MessageLog, Role};
use strategy::{StrategyRegistry, UserInput};

/// Free-form key/value body exchanged with the backend
pub type Payload = serde_json::Map<String, Value>;

/// Where the session is in its exchange lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    /// No exchange in flight and nothing pending
    Idle,
    /// Payload handed to the channel, not yet acknowledged
    Submitting,
    /// Events are arriving
    Streaming,
    /// The backend paused the turn for a user choice
    AwaitingSelection(SelectionRequest),
    /// The last exchange failed with this message
    Failed(String),
}

impl SessionPhase {
    /// Short lowercase name, used in logs and the REPL prompt.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Streaming => "streaming",
            Self::AwaitingSelection(_) => "awaiting-selection",
            Self::Failed(_) => "failed",
        }
    }
}

/// What handling one channel event did to the session
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The event belonged to a closed or cancelled exchange
    Discarded,
    /// The event was understood but changed nothing
    Ignored,
    /// The backend accepted the run
    Acknowledged,
    /// Content was appended to the exchange's agent message
    MessageDelta {
        /// Id of the agent message that grew
        message_id: String,
        /// The appended chunk
        delta: MessageContent,
    },
    /// A recognized update was recorded
    Update {
        /// Activity event appended to the live buffer, if any
        activity: Option<ActivityEvent>,
        /// True if this update started the selection handshake
        selection_requested: bool,
    },
    /// The exchange finished normally
    Completed {
        /// True if the completed message carried a choice list
        selection_requested: bool,
    },
    /// The exchange failed
    Failed(String),
}

#[derive(Debug, Clone)]
struct OpenExchange {
    id: ExchangeId,
    agent_message_id: Option<String>,
}

/// State machine for one conversation with one agent
#[derive(Debug)]
pub struct ConversationSession {
    agent_id: String,
    registry: StrategyRegistry,
    channel: Arc<dyn StreamingChannel>,
    log: MessageLog,
    activity: ActivityAggregator,
    phase: SessionPhase,
    exchange: Option<OpenExchange>,
    next_exchange: u64,
    reference_document: Option<String>,
}

impl ConversationSession {
    /// Creates a session for `agent_id` using the built-in strategies.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use agentdesk::channel::fake::FakeChannel;
    /// use agentdesk::session::{ConversationSession, SessionPhase};
    ///
    /// let session = ConversationSession::new("contentAgent", Arc::new(FakeChannel::new()));
    /// assert_eq!(session.phase(), &SessionPhase::Idle);
    /// assert!(session.messages().is_empty());
    /// ```
    pub fn new(agent_id: impl Into<String>, channel: Arc<dyn StreamingChannel>) -> Self {
        Self::with_registry(agent_id, channel, StrategyRegistry::with_builtin())
    }

    /// Creates a session with a caller-provided strategy registry.
    pub fn with_registry(
        agent_id: impl Into<String>,
        channel: Arc<dyn StreamingChannel>,
        registry: StrategyRegistry,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            registry,
            channel,
            log: MessageLog::new(),
            activity: ActivityAggregator::new(),
            phase: SessionPhase::Idle,
            exchange: None,
            next_exchange: 1,
            reference_document: None,
        }
    }

    /// Active agent identifier.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Current phase.
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// True while an exchange is submitting or streaming.
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SessionPhase::Submitting | SessionPhase::Streaming)
    }

    /// Failure message of the last exchange, if it failed.
    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            SessionPhase::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// The selection the backend is waiting for.
    pub fn pending_selection(&self) -> Option<&SelectionRequest> {
        match &self.phase {
            SessionPhase::AwaitingSelection(request) => Some(request),
            _ => None,
        }
    }

    /// The conversation log.
    pub fn messages(&self) -> &MessageLog {
        &self.log
    }

    /// The activity aggregator.
    pub fn activity(&self) -> &ActivityAggregator {
        &self.activity
    }

    /// Exchange whose events are currently accepted.
    pub fn current_exchange(&self) -> Option<ExchangeId> {
        self.exchange.as_ref().map(|e| e.id)
    }

    /// Id of the agent message the open exchange is writing.
    pub fn streaming_message_id(&self) -> Option<&str> {
        self.exchange
            .as_ref()
            .and_then(|e| e.agent_message_id.as_deref())
    }

    /// Reference document sent with the last submission.
    pub fn reference_document(&self) -> Option<&str> {
        self.reference_document.as_deref()
    }

    /// The channel this session submits to.
    pub fn channel(&self) -> Arc<dyn StreamingChannel> {
        Arc::clone(&self.channel)
    }

    /// Activity to render next to `message_id`.
    pub fn activity_for(&self, message_id: &str) -> ActivityView<'_> {
        let streaming = self.streaming_message_id() == Some(message_id);
        self.activity.view_for(message_id, streaming)
    }

    /// Starts a new exchange with `input`.
    ///
    /// # Errors
    ///
    /// - [`AgentDeskError::SessionBusy`] while an exchange is in flight.
    /// - [`AgentDeskError::SelectionPending`] while a choice is pending.
    /// - [`AgentDeskError::Configuration`] if the agent has no strategy.
    /// - [`AgentDeskError::Channel`] if the channel refused the run; the
    ///   session is then `Failed`.
    ///
    /// Only the channel error changes the session.
    pub async fn submit(&mut self, input: UserInput) -> Result<ExchangeId> {
        match &self.phase {
            SessionPhase::Submitting | SessionPhase::Streaming => {
                return Err(AgentDeskError::SessionBusy.into())
            }
            SessionPhase::AwaitingSelection(_) => {
                return Err(AgentDeskError::SelectionPending.into())
            }
            SessionPhase::Idle | SessionPhase::Failed(_) => {}
        }
        self.dispatch(input, None).await
    }

    /// Answers the pending selection with `choice` and continues the turn.
    ///
    /// The choice is logged as a human message and merged into the resume
    /// context captured when the selection was raised. The reference
    /// document of the paused submission is sent again.
    ///
    /// # Errors
    ///
    /// - [`AgentDeskError::SessionBusy`] while an exchange is in flight.
    /// - [`AgentDeskError::NoPendingSelection`] if nothing is pending.
    /// - [`AgentDeskError::Validation`] for a blank choice.
    /// - [`AgentDeskError::Channel`] as for [`Self::submit`].
    pub async fn resolve_selection(&mut self, choice: &str) -> Result<ExchangeId> {
        let request = match &self.phase {
            SessionPhase::Submitting | SessionPhase::Streaming => {
                return Err(AgentDeskError::SessionBusy.into())
            }
            SessionPhase::AwaitingSelection(request) => request.clone(),
            SessionPhase::Idle | SessionPhase::Failed(_) => {
                return Err(AgentDeskError::NoPendingSelection.into())
            }
        };

        let choice = normalize_choice(&request, choice)?;
        tracing::info!(agent = %self.agent_id, choice = %choice, "selection resolved");

        let input = UserInput {
            content: choice,
            srt: self.reference_document.clone(),
        };
        let logged = self.log.len();
        match self.dispatch(input, request.resume_context.clone()).await {
            Ok(id) => Ok(id),
            Err(err) => {
                if matches!(kind_of(&err), Some(AgentDeskError::Channel(_))) {
                    // The choice can be sent again once the channel recovers.
                    if self.log.len() > logged {
                        self.log.pop();
                    }
                    tracing::warn!("resume refused by the channel; selection kept");
                    self.phase = SessionPhase::AwaitingSelection(request);
                }
                Err(err)
            }
        }
    }

    /// Marks the pending choice list as dismissed; the session keeps waiting.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDeskError::NoPendingSelection`] if nothing is pending.
    pub fn dismiss_selection(&mut self) -> Result<()> {
        match &mut self.phase {
            SessionPhase::AwaitingSelection(request) => {
                request.dismissed = true;
                tracing::debug!("choice list dismissed; selection still pending");
                Ok(())
            }
            _ => Err(AgentDeskError::NoPendingSelection.into()),
        }
    }

    /// Shows a dismissed choice list again.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDeskError::NoPendingSelection`] if nothing is pending.
    pub fn reopen_selection(&mut self) -> Result<()> {
        match &mut self.phase {
            SessionPhase::AwaitingSelection(request) => {
                request.dismissed = false;
                Ok(())
            }
            _ => Err(AgentDeskError::NoPendingSelection.into()),
        }
    }

    /// Aborts the exchange in flight.
    ///
    /// Any partial agent message stays in the log and keeps the activity
    /// recorded so far. Later events for the exchange are discarded. An
    /// exchange still streaming its tail after requesting a selection can be
    /// stopped too; the selection stays pending.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDeskError::NotCancellable`] when no exchange is open.
    pub async fn cancel(&mut self) -> Result<()> {
        let awaiting = matches!(self.phase, SessionPhase::AwaitingSelection(_));
        if !self.is_loading() && !(awaiting && self.exchange.is_some()) {
            return Err(AgentDeskError::NotCancellable.into());
        }
        let closed = self.close_exchange().await;
        if !awaiting {
            self.phase = SessionPhase::Idle;
        }
        tracing::info!(exchange = ?closed, phase = self.phase.name(), "exchange cancelled");
        Ok(())
    }

    /// Discards the conversation and starts over with `agent_id`.
    ///
    /// Stops any open exchange and drops every strategy's cached context.
    pub async fn switch_agent(&mut self, agent_id: impl Into<String>) {
        let agent_id = agent_id.into();
        tracing::info!(from = %self.agent_id, to = %agent_id, "switching agent");
        self.reset().await;
        self.agent_id = agent_id;
    }

    /// Discards the conversation, keeping the agent.
    pub async fn reset(&mut self) {
        if let Some(open) = self.exchange.take() {
            self.channel.stop(open.id).await;
        }
        self.log = MessageLog::new();
        self.activity = ActivityAggregator::new();
        self.registry.reset_all();
        self.phase = SessionPhase::Idle;
        self.reference_document = None;
    }

    /// Applies one channel event.
    ///
    /// Never blocks and never fails: events that do not belong to the open
    /// exchange, or that cannot be interpreted, leave the session unchanged.
    pub fn on_event(&mut self, exchange: ExchangeId, event: StreamEvent) -> EventOutcome {
        if self.current_exchange() != Some(exchange) {
            tracing::debug!(%exchange, "discarding event for closed exchange");
            return EventOutcome::Discarded;
        }

        match event {
            StreamEvent::Acknowledged { run_id } => {
                tracing::debug!(%exchange, run_id = ?run_id, "run acknowledged");
                self.mark_streaming();
                EventOutcome::Acknowledged
            }
            StreamEvent::MessageDelta { id, role, content } => {
                self.mark_streaming();
                self.apply_delta(id, role, content)
            }
            StreamEvent::Update(update) => {
                self.mark_streaming();
                self.apply_update(&update)
            }
            StreamEvent::Error(message) => self.fail_exchange(message),
            StreamEvent::Finished => self.complete_exchange(),
            StreamEvent::Unclassified(raw) => {
                tracing::warn!(%exchange, event = %raw, "dropping unclassified stream event");
                EventOutcome::Ignored
            }
        }
    }

    async fn dispatch(&mut self, input: UserInput, resume: Option<Payload>) -> Result<ExchangeId> {
        let visible = input.has_visible_content();
        let strategy = self.registry.get_mut(&self.agent_id)?;

        if visible {
            self.log.push(Message::human(input.content.clone()));
        }

        let shaped = match resume {
            Some(context) => strategy.resume(self.log.as_slice(), context, &input),
            None => strategy.shape(self.log.as_slice(), &input),
        };
        let payload = match shaped {
            Ok(payload) => payload,
            Err(err) => {
                if visible {
                    self.log.pop();
                }
                return Err(err);
            }
        };

        // A paused exchange may still be streaming its tail.
        self.close_exchange().await;

        let id = ExchangeId(self.next_exchange);
        self.next_exchange += 1;
        self.exchange = Some(OpenExchange {
            id,
            agent_message_id: None,
        });
        self.phase = SessionPhase::Submitting;
        self.reference_document = input.srt.clone();
        tracing::info!(agent = %self.agent_id, exchange = %id, "submitting");

        if let Err(err) = self.channel.submit(id, &self.agent_id, payload).await {
            let message = match kind_of(&err) {
                Some(AgentDeskError::Channel(message)) => message.clone(),
                _ => err.to_string(),
            };
            self.exchange = None;
            self.phase = SessionPhase::Failed(message.clone());
            tracing::warn!(exchange = %id, error = %message, "submission failed");
            return Err(AgentDeskError::Channel(message).into());
        }

        Ok(id)
    }

    fn mark_streaming(&mut self) {
        if self.phase == SessionPhase::Submitting {
            self.phase = SessionPhase::Streaming;
            tracing::debug!("streaming");
        }
    }

    fn apply_delta(&mut self, id: Option<String>, role: Role, content: MessageContent) -> EventOutcome {
        if role == Role::Human {
            tracing::debug!("ignoring echoed human message");
            return EventOutcome::Ignored;
        }
        let Some(open) = self.exchange.as_mut() else {
            return EventOutcome::Discarded;
        };

        let message_id = if let Some(existing) = open.agent_message_id.clone() {
            existing
        } else {
            let message_id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            if self.log.contains(&message_id) {
                tracing::debug!(message_id = %message_id, "ignoring replay of an earlier message");
                return EventOutcome::Ignored;
            }
            self.log
                .push(Message::agent(message_id.clone(), MessageContent::default()));
            open.agent_message_id = Some(message_id.clone());
            message_id
        };

        if let Some(message) = self.log.get_mut(&message_id) {
            message.content.append(&content);
        }
        EventOutcome::MessageDelta {
            message_id,
            delta: content,
        }
    }

    fn apply_update(&mut self, update: &Payload) -> EventOutcome {
        if let Ok(strategy) = self.registry.get_mut(&self.agent_id) {
            strategy.on_update_event(update);
        }

        let activity = self.activity.record(update).cloned();

        let mut selection_requested = false;
        if let Some(request) = detect_in_update(update) {
            if self.pending_selection().is_some() {
                tracing::debug!("selection already pending; keeping the first request");
            } else {
                tracing::info!(choices = request.choices.len(), "backend requested a selection");
                self.phase = SessionPhase::AwaitingSelection(request);
                selection_requested = true;
            }
        }

        if activity.is_none() && !selection_requested {
            tracing::debug!("update carried no recognized field");
            return EventOutcome::Ignored;
        }
        EventOutcome::Update {
            activity,
            selection_requested,
        }
    }

    fn complete_exchange(&mut self) -> EventOutcome {
        let Some(open) = self.exchange.take() else {
            return EventOutcome::Discarded;
        };
        self.activity.finalize(open.agent_message_id.as_deref());

        let mut selection_requested = false;
        if self.pending_selection().is_none() {
            let cached = self
                .registry
                .get_mut(&self.agent_id)
                .ok()
                .and_then(|strategy| strategy.resume_context().cloned());
            let request = open
                .agent_message_id
                .as_deref()
                .and_then(|id| self.log.get(id))
                .and_then(|message| detect_in_message(message, cached.as_ref()));

            match request {
                Some(request) => {
                    tracing::info!(choices = request.choices.len(), "agent message carries a choice list");
                    self.phase = SessionPhase::AwaitingSelection(request);
                    selection_requested = true;
                }
                None => self.phase = SessionPhase::Idle,
            }
        }

        tracing::info!(exchange = %open.id, phase = self.phase.name(), "exchange completed");
        EventOutcome::Completed {
            selection_requested,
        }
    }

    fn fail_exchange(&mut self, message: String) -> EventOutcome {
        let Some(open) = self.exchange.take() else {
            return EventOutcome::Discarded;
        };
        self.activity.finalize(open.agent_message_id.as_deref());

        if self.pending_selection().is_some() {
            tracing::warn!(exchange = %open.id, error = %message, "stream failed after requesting a selection; selection kept");
        } else {
            tracing::warn!(exchange = %open.id, error = %message, "exchange failed");
            self.phase = SessionPhase::Failed(message.clone());
        }
        EventOutcome::Failed(message)
    }

    /// Stops the open exchange, archiving its live activity.
    async fn close_exchange(&mut self) -> Option<ExchangeId> {
        let open = self.exchange.take()?;
        self.channel.stop(open.id).await;
        self.activity.finalize(open.agent_message_id.as_deref());
        Some(open.id)
    }
}
