//! Event pump
//!
//! Delivers channel events to a session one at a time, in arrival order.
//! Every mutation goes through the session's single mutex, so a pump task
//! and a user-facing task can share one [`ConversationSession`].
//!
//! Two drivers are provided:
//!
//! - [`pump_exchange`] follows the open exchange until it closes, racing it
//!   against a [`CancellationToken`] (the REPL uses this with Ctrl-C).
//! - [`spawn_event_pump`] runs for the lifetime of a session in a background
//!   task and reports every [`EventOutcome`].

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{ConversationSession, EventOutcome};
use crate::channel::{ChannelEvent, ExchangeId, StreamingChannel};

/// A session shared between the pump and its callers.
pub type SharedSession = Arc<Mutex<ConversationSession>>;

/// Wraps a session for sharing.
pub fn share(session: ConversationSession) -> SharedSession {
    Arc::new(Mutex::new(session))
}

/// Why [`pump_exchange`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The exchange finished, failed or was replaced
    ExchangeClosed,
    /// The cancellation token fired
    Cancelled,
    /// The channel's event stream ended
    ChannelClosed,
}

/// Feeds `events` into `session` until its open exchange closes.
///
/// `observer` sees each outcome after the session lock is released. When
/// `cancellation` fires, the exchange is cancelled if it is still
/// open.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use agentdesk::channel::fake::FakeChannel;
/// use agentdesk::channel::{StreamEvent, StreamingChannel};
/// use agentdesk::session::pump::{pump_exchange, share, PumpExit};
/// use agentdesk::session::strategy::UserInput;
/// use agentdesk::session::ConversationSession;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let channel = Arc::new(FakeChannel::new());
/// let session = share(ConversationSession::new("comicsAgent", channel.clone()));
/// let id = session.lock().await.submit(UserInput::text("a cat")).await.unwrap();
/// channel.emit(id, StreamEvent::Finished);
///
/// let mut events = channel.events();
/// let exit = pump_exchange(&session, &mut events, &CancellationToken::new(), |_| {}).await;
/// assert_eq!(exit, PumpExit::ExchangeClosed);
/// # }
/// ```
pub async fn pump_exchange<S, F>(
    session: &SharedSession,
    events: &mut S,
    cancellation: &CancellationToken,
    mut observer: F,
) -> PumpExit
where
    S: Stream<Item = ChannelEvent> + Unpin,
    F: FnMut(&EventOutcome),
{
    let Some(target) = session.lock().await.current_exchange() else {
        return PumpExit::ExchangeClosed;
    };

    loop {
        tokio::select! {
            biased;

            _ = cancellation.cancelled() => {
                let mut guard = session.lock().await;
                if guard.current_exchange() == Some(target) {
                    if let Err(e) = guard.cancel().await {
                        tracing::debug!("cancel after token fired: {e}");
                    }
                }
                return PumpExit::Cancelled;
            }

            next = events.next() => {
                let Some(ChannelEvent { exchange, event }) = next else {
                    tracing::debug!(%target, "event stream ended before the exchange closed");
                    return PumpExit::ChannelClosed;
                };

                let (outcome, still_open) = {
                    let mut guard = session.lock().await;
                    let outcome = guard.on_event(exchange, event);
                    (outcome, guard.current_exchange() == Some(target))
                };
                observer(&outcome);

                if !still_open {
                    return PumpExit::ExchangeClosed;
                }
            }
        }
    }
}

/// Spawns a task that routes every channel event into `session`.
///
/// Each outcome is sent on `outcomes` together with its exchange id. The
/// task stops when `shutdown` fires or the channel's stream ends.
pub fn spawn_event_pump(
    session: SharedSession,
    channel: Arc<dyn StreamingChannel>,
    shutdown: CancellationToken,
    outcomes: mpsc::UnboundedSender<(ExchangeId, EventOutcome)>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = channel.events();
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                next = events.next() => {
                    let Some(ChannelEvent { exchange, event }) = next else {
                        break;
                    };
                    let outcome = session.lock().await.on_event(exchange, event);
                    if outcomes.send((exchange, outcome)).is_err() {
                        tracing::debug!("outcome receiver dropped; stopping event pump");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fake::FakeChannel;
    use crate::channel::StreamEvent;
    use crate::session::message::{MessageContent, Role};
    use crate::session::strategy::UserInput;
    use crate::session::SessionPhase;

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::MessageDelta {
            id: Some("a1".to_string()),
            role: Role::Agent,
            content: MessageContent::from(text),
        }
    }

    #[tokio::test]
    async fn test_pump_exchange_runs_until_finished() {
        let channel = Arc::new(FakeChannel::new());
        let session = share(ConversationSession::new("contentAgent", channel.clone()));
        let id = session
            .lock()
            .await
            .submit(UserInput::text("go"))
            .await
            .unwrap();

        channel.emit(ExchangeId(99), delta("stale"));
        channel.emit(id, delta("Hi"));
        channel.emit(id, StreamEvent::Finished);
        channel.emit(id, delta("after"));

        let mut seen = Vec::new();
        let mut events = channel.events();
        let exit = pump_exchange(&session, &mut events, &CancellationToken::new(), |o| {
            seen.push(o.clone())
        })
        .await;

        assert_eq!(exit, PumpExit::ExchangeClosed);
        assert_eq!(seen[0], EventOutcome::Discarded);
        assert_eq!(seen.len(), 3);
        let guard = session.lock().await;
        assert_eq!(guard.phase(), &SessionPhase::Idle);
        assert_eq!(guard.messages().get("a1").unwrap().content.as_text(), "Hi");
    }

    #[tokio::test]
    async fn test_pump_exchange_cancellation_cancels_session() {
        let channel = Arc::new(FakeChannel::new());
        let session = share(ConversationSession::new("contentAgent", channel.clone()));
        let id = session
            .lock()
            .await
            .submit(UserInput::text("go"))
            .await
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let mut events = channel.events();
        let exit = pump_exchange(&session, &mut events, &token, |_| {}).await;

        assert_eq!(exit, PumpExit::Cancelled);
        assert_eq!(channel.stopped(), vec![id]);
        assert_eq!(session.lock().await.phase(), &SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_pump_exchange_without_open_exchange() {
        let channel = Arc::new(FakeChannel::new());
        let session = share(ConversationSession::new("contentAgent", channel.clone()));
        let mut events = channel.events();
        let exit = pump_exchange(&session, &mut events, &CancellationToken::new(), |_| {}).await;
        assert_eq!(exit, PumpExit::ExchangeClosed);
    }

    #[tokio::test]
    async fn test_spawned_pump_reports_outcomes_in_order() {
        let channel = Arc::new(FakeChannel::new());
        let session = share(ConversationSession::new("contentAgent", channel.clone()));
        let id = session
            .lock()
            .await
            .submit(UserInput::text("go"))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = spawn_event_pump(session.clone(), channel.clone(), shutdown.clone(), tx);

        channel.emit(id, StreamEvent::Acknowledged { run_id: None });
        channel.emit(id, StreamEvent::Finished);

        assert_eq!(rx.recv().await.unwrap(), (id, EventOutcome::Acknowledged));
        assert_eq!(
            rx.recv().await.unwrap(),
            (
                id,
                EventOutcome::Completed {
                    selection_requested: false
                }
            )
        );

        shutdown.cancel();
        handle.await.unwrap();
        assert!(!session.lock().await.is_loading());
    }
}
