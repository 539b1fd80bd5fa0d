//! In-process fake streaming channel
//!
//! [`FakeChannel`] replaces the HTTP backend in tests. It records every
//! submission and stop request, and lets the test push [`StreamEvent`]s that
//! come back out of [`StreamingChannel::events`].
//!
//! # Example
//!
//! ```
//! use agentdesk::channel::fake::FakeChannel;
//! use agentdesk::channel::{ExchangeId, StreamEvent, StreamingChannel};
//! use agentdesk::session::Payload;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let channel = FakeChannel::new();
//! channel.submit(ExchangeId(1), "contentAgent", Payload::new()).await.unwrap();
//! assert_eq!(channel.submitted()[0].agent_id, "contentAgent");
//!
//! channel.emit(ExchangeId(1), StreamEvent::Finished);
//! use futures::StreamExt;
//! let event = channel.events().next().await.unwrap();
//! assert_eq!(event.event, StreamEvent::Finished);
//! # }
//! ```

use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};

use futures::Stream;
use tokio::sync::{mpsc, Mutex};

use super::{ChannelEvent, ExchangeId, StreamEvent, StreamingChannel};
use crate::error::{AgentDeskError, Result};
use crate::session::Payload;

/// A submission recorded by [`FakeChannel`]
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedRun {
    /// Exchange the run was started for
    pub exchange: ExchangeId,
    /// Agent the payload was addressed to
    pub agent_id: String,
    /// The shaped payload
    pub payload: Payload,
}

/// In-memory [`StreamingChannel`] for tests
#[derive(Debug)]
pub struct FakeChannel {
    submitted: StdMutex<Vec<SubmittedRun>>,
    stopped: StdMutex<Vec<ExchangeId>>,
    failure: StdMutex<Option<String>>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    event_rx: Arc<Mutex<mpsc::UnboundedReceiver<ChannelEvent>>>,
}

impl Default for FakeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChannel {
    /// Creates a channel that accepts every submission.
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            submitted: StdMutex::new(Vec::new()),
            stopped: StdMutex::new(Vec::new()),
            failure: StdMutex::new(None),
            event_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
        }
    }

    /// Makes every later `submit` fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.into());
        }
    }

    /// Restores normal submissions.
    pub fn recover(&self) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = None;
        }
    }

    /// Queues `event` for `exchange` on the event stream.
    pub fn emit(&self, exchange: ExchangeId, event: StreamEvent) {
        let _ = self.event_tx.send(ChannelEvent::new(exchange, event));
    }

    /// Every submission so far, in order.
    pub fn submitted(&self) -> Vec<SubmittedRun> {
        self.submitted
            .lock()
            .map(|runs| runs.clone())
            .unwrap_or_default()
    }

    /// The most recent submission.
    pub fn last_submitted(&self) -> Option<SubmittedRun> {
        self.submitted().pop()
    }

    /// Exchanges that were asked to stop, in order.
    pub fn stopped(&self) -> Vec<ExchangeId> {
        self.stopped
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl StreamingChannel for FakeChannel {
    async fn submit(&self, exchange: ExchangeId, agent_id: &str, payload: Payload) -> Result<()> {
        if let Some(message) = self.failure.lock().ok().and_then(|f| f.clone()) {
            return Err(AgentDeskError::Channel(message).into());
        }
        if let Ok(mut runs) = self.submitted.lock() {
            runs.push(SubmittedRun {
                exchange,
                agent_id: agent_id.to_string(),
                payload,
            });
        }
        Ok(())
    }

    async fn stop(&self, exchange: ExchangeId) {
        if let Ok(mut ids) = self.stopped.lock() {
            ids.push(exchange);
        }
    }

    fn events(&self) -> Pin<Box<dyn Stream<Item = ChannelEvent> + Send + '_>> {
        let rx = Arc::clone(&self.event_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let item = rx.lock().await.recv().await?;
            Some((item, rx))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_submit_records_payload() {
        let channel = FakeChannel::new();
        let mut payload = Payload::new();
        payload.insert("srt".to_string(), "a.srt".into());

        channel
            .submit(ExchangeId(4), "comicsAgent", payload.clone())
            .await
            .unwrap();

        let run = channel.last_submitted().unwrap();
        assert_eq!(run.exchange, ExchangeId(4));
        assert_eq!(run.agent_id, "comicsAgent");
        assert_eq!(run.payload, payload);
    }

    #[tokio::test]
    async fn test_fail_with_rejects_submissions_until_recovered() {
        let channel = FakeChannel::new();
        channel.fail_with("backend down");

        let err = channel
            .submit(ExchangeId(1), "contentAgent", Payload::new())
            .await
            .unwrap_err();
        assert!(matches!(kind_of(&err), Some(AgentDeskError::Channel(m)) if m == "backend down"));
        assert!(channel.submitted().is_empty());

        channel.recover();
        assert!(channel
            .submit(ExchangeId(2), "contentAgent", Payload::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_events_arrive_in_emit_order() {
        let channel = FakeChannel::new();
        channel.emit(ExchangeId(1), StreamEvent::Acknowledged { run_id: None });
        channel.emit(ExchangeId(1), StreamEvent::Finished);

        let events: Vec<_> = channel.events().take(2).collect().await;
        assert_eq!(events[0].event, StreamEvent::Acknowledged { run_id: None });
        assert_eq!(events[1].event, StreamEvent::Finished);
    }

    #[tokio::test]
    async fn test_stop_is_recorded() {
        let channel = FakeChannel::new();
        channel.stop(ExchangeId(9)).await;
        assert_eq!(channel.stopped(), vec![ExchangeId(9)]);
    }
}
