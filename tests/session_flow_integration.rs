//! End-to-end session flows over the in-process fake channel
//!
//! Each test drives a `ConversationSession` through the public API the chat
//! REPL uses: submit, pump events, resolve selections, cancel.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agentdesk::channel::fake::FakeChannel;
use agentdesk::channel::{ExchangeId, StreamEvent, StreamingChannel};
use agentdesk::session::activity::ActivityView;
use agentdesk::session::message::{MessageContent, Role};
use agentdesk::session::pump::{pump_exchange, share, spawn_event_pump, PumpExit};
use agentdesk::session::strategy::UserInput;
use agentdesk::session::view::EntryBody;
use agentdesk::session::{ConversationSession, EventOutcome, SessionPhase};

fn agent_delta(id: &str, text: &str) -> StreamEvent {
    StreamEvent::MessageDelta {
        id: Some(id.to_string()),
        role: Role::Agent,
        content: MessageContent::from(text),
    }
}

fn update(value: serde_json::Value) -> StreamEvent {
    StreamEvent::Update(value.as_object().cloned().unwrap())
}

/// Topic generation, selection and the resumed article run.
#[tokio::test]
async fn test_topic_selection_round_trip() {
    let channel = Arc::new(FakeChannel::new());
    let session = share(ConversationSession::new("xiaohongshuAgent", channel.clone()));
    let mut events = channel.events();
    let never = CancellationToken::new();

    let first = session
        .lock()
        .await
        .submit(UserInput::text("").with_srt("lecture1.srt"))
        .await
        .unwrap();
    let shaped = channel.last_submitted().unwrap().payload;
    assert_eq!(shaped["srt"], "lecture1.srt");
    assert_eq!(shaped["selected_topic"], "");

    channel.emit(first, StreamEvent::Acknowledged { run_id: None });
    channel.emit(first, agent_delta("m-1", "Here are some topics"));
    channel.emit(
        first,
        update(json!({"generate_topic": {"topics": ["Spring looks", "Desk setup"], "viewpoints": "v"}})),
    );
    channel.emit(first, StreamEvent::Finished);

    let mut seen = Vec::new();
    let exit = pump_exchange(&session, &mut events, &never, |o| seen.push(o.clone())).await;
    assert_eq!(exit, PumpExit::ExchangeClosed);
    assert!(seen.iter().any(|o| matches!(
        o,
        EventOutcome::Update {
            selection_requested: true,
            ..
        }
    )));

    {
        let guard = session.lock().await;
        let request = guard.pending_selection().expect("selection pending");
        assert_eq!(request.choices, vec!["Spring looks", "Desk setup"]);
        // Only the agent message; the empty build turn is not logged.
        assert_eq!(guard.messages().len(), 1);
        match guard.activity_for("m-1") {
            ActivityView::Historical(events) => {
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].title, "topics generated");
            }
            other => panic!("expected historical activity, got {other:?}"),
        }
    }

    let second = session
        .lock()
        .await
        .resolve_selection("Desk setup")
        .await
        .unwrap();
    assert_ne!(first, second);

    let resumed = channel.last_submitted().unwrap();
    assert_eq!(resumed.exchange, second);
    assert_eq!(resumed.payload["selected_topic"], "Desk setup");
    assert_eq!(resumed.payload["viewpoints"], "v");
    assert_eq!(resumed.payload["topics"], json!(["Spring looks", "Desk setup"]));

    channel.emit(second, agent_delta("m-2", "# Desk setup\n"));
    channel.emit(second, update(json!({"generate_article": {"article": "..."}})));
    channel.emit(second, StreamEvent::Finished);
    let exit = pump_exchange(&session, &mut events, &never, |_| {}).await;
    assert_eq!(exit, PumpExit::ExchangeClosed);

    let guard = session.lock().await;
    assert_eq!(guard.phase(), &SessionPhase::Idle);
    let roles: Vec<Role> = guard.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::Agent, Role::Human, Role::Agent]);
    assert_eq!(guard.messages().as_slice()[1].content.as_text(), "Desk setup");
    assert_eq!(guard.reference_document(), Some("lecture1.srt"));
}

/// A completed message carrying a choice list renders as choices.
#[tokio::test]
async fn test_choice_list_message_renders_as_choices() {
    let channel = Arc::new(FakeChannel::new());
    let session = share(ConversationSession::new("contentAgent", channel.clone()));
    let mut events = channel.events();

    let id = session
        .lock()
        .await
        .submit(UserInput::text("Write about my talk").with_srt("talk.srt"))
        .await
        .unwrap();
    assert_eq!(
        channel.last_submitted().unwrap().payload["messages"]
            .as_array()
            .map(Vec::len),
        Some(1)
    );

    channel.emit(id, agent_delta("m-1", r#"{"type":"select","#));
    channel.emit(id, agent_delta("m-1", r#""topics":["A","B"]}"#));
    channel.emit(id, StreamEvent::Finished);
    pump_exchange(&session, &mut events, &CancellationToken::new(), |_| {}).await;

    let guard = session.lock().await;
    assert!(guard.pending_selection().is_some());
    let transcript = guard.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(
        transcript[1].body,
        EntryBody::Choices(vec!["A".to_string(), "B".to_string()])
    );
}

/// Cancelling mid-stream stops the run and ignores its tail.
#[tokio::test]
async fn test_cancel_stops_exchange_and_discards_tail() {
    let channel = Arc::new(FakeChannel::new());
    let session = share(ConversationSession::new("comicsAgent", channel.clone()));
    let mut events = channel.events();

    let id = session
        .lock()
        .await
        .submit(UserInput::text("a cat in space"))
        .await
        .unwrap();
    channel.emit(id, agent_delta("m-1", "Outline: "));

    let cancellation = CancellationToken::new();
    let trigger = cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let exit = pump_exchange(&session, &mut events, &cancellation, |_| {}).await;
    assert_eq!(exit, PumpExit::Cancelled);
    assert_eq!(channel.stopped(), vec![id]);

    let mut guard = session.lock().await;
    assert_eq!(guard.phase(), &SessionPhase::Idle);
    assert_eq!(guard.messages().len(), 2);
    assert_eq!(
        guard.on_event(id, agent_delta("m-1", "more")),
        EventOutcome::Discarded
    );
    assert_eq!(guard.messages().as_slice()[1].content.as_text(), "Outline: ");
}

/// The background pump reports every outcome, including stale ones.
#[tokio::test]
async fn test_background_pump_reports_outcomes() {
    let fake = Arc::new(FakeChannel::new());
    let channel: Arc<dyn StreamingChannel> = fake.clone();
    let session = share(ConversationSession::new("contentAgent", channel.clone()));
    let shutdown = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pump = spawn_event_pump(session.clone(), channel, shutdown.clone(), tx);

    let stale = ExchangeId(99);
    let id = session
        .lock()
        .await
        .submit(UserInput::text("hello"))
        .await
        .unwrap();
    fake.emit(stale, agent_delta("x", "ghost"));
    fake.emit(id, StreamEvent::Error("model unavailable".to_string()));

    let (first_id, first) = rx.recv().await.unwrap();
    assert_eq!(first_id, stale);
    assert_eq!(first, EventOutcome::Discarded);
    let (_, second) = rx.recv().await.unwrap();
    assert_eq!(second, EventOutcome::Failed("model unavailable".to_string()));

    {
        let guard = session.lock().await;
        assert_eq!(guard.error(), Some("model unavailable"));
        assert!(!guard.is_loading());
    }

    shutdown.cancel();
    pump.await.unwrap();
}

/// A refused submission fails the session; the next one may succeed.
#[tokio::test]
async fn test_channel_refusal_then_recovery() {
    let channel = Arc::new(FakeChannel::new());
    let mut session = ConversationSession::new("contentAgent", channel.clone());

    channel.fail_with("connection refused");
    tokio_test::assert_err!(session.submit(UserInput::text("first")).await);
    assert_eq!(session.error(), Some("connection refused"));

    channel.recover();
    let id = tokio_test::assert_ok!(session.submit(UserInput::text("second")).await);
    assert_eq!(session.current_exchange(), Some(id));
    assert_eq!(session.phase(), &SessionPhase::Submitting);
}
