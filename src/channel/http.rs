//! HTTP/SSE streaming channel
//!
//! Runs an agent by POSTing the submission payload to
//! `{base}/threads/{thread_id}/runs/stream` and parsing the
//! `text/event-stream` response. The thread is created lazily on the first
//! submission (`POST {base}/threads`) and reused for the session's lifetime.
//!
//! Each run is driven by its own Tokio task; [`StreamingChannel::stop`]
//! aborts that task, which drops the response body and closes the
//! connection.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::{ChannelEvent, ExchangeId, StreamEvent, StreamingChannel};
use crate::error::{AgentDeskError, Result};
use crate::session::Payload;

/// Stream modes requested for every run.
const STREAM_MODES: [&str; 2] = ["messages-tuple", "updates"];

/// Streaming channel backed by an HTTP agent server.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use agentdesk::channel::http::HttpStreamChannel;
///
/// let channel = HttpStreamChannel::new("http://localhost:2024", Duration::from_secs(10)).unwrap();
/// ```
#[derive(Debug)]
pub struct HttpStreamChannel {
    /// Underlying reqwest HTTP client.
    http_client: reqwest::Client,
    /// Server base URL without a trailing slash.
    base_url: String,
    /// Thread shared by every run of this channel.
    thread_id: Arc<RwLock<Option<String>>>,
    /// Sender for parsed events.
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    /// Shared receiver exposed via `events()`.
    event_rx: Arc<Mutex<mpsc::UnboundedReceiver<ChannelEvent>>>,
    /// Tasks driving runs that may still be streaming.
    runs: Mutex<HashMap<ExchangeId, JoinHandle<()>>>,
}

impl HttpStreamChannel {
    /// Construct a channel targeting `base_url`.
    ///
    /// Only the connect phase is bounded by `connect_timeout`; a run may
    /// stream for as long as the backend keeps it open.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url).map_err(AgentDeskError::from)?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(AgentDeskError::from)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            thread_id: Arc::new(RwLock::new(None)),
            event_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
            runs: Mutex::new(HashMap::new()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Returns the thread id, creating the thread on first use.
    async fn ensure_thread(&self) -> Result<String> {
        if let Some(id) = self.thread_id.read().await.clone() {
            return Ok(id);
        }

        let mut guard = self.thread_id.write().await;
        if let Some(id) = guard.clone() {
            return Ok(id);
        }

        let response = self
            .http_client
            .post(self.endpoint("threads"))
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| AgentDeskError::Channel(format!("thread creation failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentDeskError::Channel(format!(
                "thread creation returned HTTP {}",
                status
            ))
            .into());
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentDeskError::Channel(format!("invalid thread response: {}", e)))?;
        let id = body
            .get("thread_id")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentDeskError::Channel("thread response had no thread_id".to_string()))?
            .to_string();

        tracing::debug!(thread_id = %id, "created backend thread");
        *guard = Some(id.clone());
        Ok(id)
    }
}

#[async_trait::async_trait]
impl StreamingChannel for HttpStreamChannel {
    async fn submit(&self, exchange: ExchangeId, agent_id: &str, payload: Payload) -> Result<()> {
        let thread_id = self.ensure_thread().await?;
        let url = self.endpoint(&format!("threads/{}/runs/stream", thread_id));
        let body = json!({
            "assistant_id": agent_id,
            "input": Value::Object(payload),
            "stream_mode": STREAM_MODES,
        });

        let request = self
            .http_client
            .post(url)
            .header("Accept", "text/event-stream")
            .json(&body);
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            run_stream(request, exchange, event_tx).await;
        });

        let mut runs = self.runs.lock().await;
        runs.retain(|_, task| !task.is_finished());
        runs.insert(exchange, handle);
        tracing::debug!(%exchange, agent = %agent_id, "run submitted");
        Ok(())
    }

    async fn stop(&self, exchange: ExchangeId) {
        if let Some(task) = self.runs.lock().await.remove(&exchange) {
            task.abort();
            tracing::debug!(%exchange, "run aborted");
        }
    }

    fn events(&self) -> Pin<Box<dyn Stream<Item = ChannelEvent> + Send + '_>> {
        let rx = Arc::clone(&self.event_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }
}

/// Sends the run request and forwards its events until the stream ends.
async fn run_stream(
    request: reqwest::RequestBuilder,
    exchange: ExchangeId,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    let emit = |event: StreamEvent| {
        let _ = event_tx.send(ChannelEvent::new(exchange, event));
    };

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            emit(StreamEvent::Error(format!("run request failed: {}", e)));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        emit(StreamEvent::Error(format!("HTTP {}: {}", status, detail.trim())));
        return;
    }

    let terminated = parse_sse_stream(response.bytes_stream(), exchange, event_tx.clone()).await;
    if !terminated {
        emit(StreamEvent::Finished);
    }
}

// ---------------------------------------------------------------------------
// SSE parser
// ---------------------------------------------------------------------------

/// Parse an SSE byte stream and forward each classified event to `event_tx`.
///
/// Returns `true` if a terminal event (`end` or `error`) was forwarded, so
/// the caller knows whether to synthesize [`StreamEvent::Finished`].
///
/// SSE field processing:
///
/// - `event:` -- names the event; see [`StreamEvent::from_sse`].
/// - `data:` -- multi-line values are joined with `\n`.
/// - `id:` / `retry:` / comments -- ignored.
///
/// A transport error mid-stream is forwarded as [`StreamEvent::Error`].
pub async fn parse_sse_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>>,
    exchange: ExchangeId,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
) -> bool {
    use futures::StreamExt;

    // Raw bytes between blank-line boundaries; decoded one whole block at a
    // time so a multi-byte character split across chunks stays intact.
    let mut buffer: Vec<u8> = Vec::new();

    tokio::pin!(byte_stream);

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(e) => {
                let _ = event_tx.send(ChannelEvent::new(
                    exchange,
                    StreamEvent::Error(format!("stream interrupted: {}", e)),
                ));
                return true;
            }
        };

        // `\r` never occurs inside a UTF-8 multi-byte sequence.
        buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        while let Some(pos) = find_block_end(&buffer) {
            let block: Vec<u8> = buffer.drain(..pos + 2).collect();
            let event_block = String::from_utf8_lossy(&block[..pos]);
            if forward_sse_event(&event_block, exchange, &event_tx) {
                return true;
            }
        }
    }

    let rest = String::from_utf8_lossy(&buffer);
    if !rest.trim().is_empty() {
        return forward_sse_event(&rest, exchange, &event_tx);
    }
    false
}

/// Position of the first blank-line boundary (`\n\n`) in `buffer`.
fn find_block_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

/// Classify a single SSE event block and forward it.
///
/// Returns `true` for terminal events.
fn forward_sse_event(
    event_block: &str,
    exchange: ExchangeId,
    event_tx: &mpsc::UnboundedSender<ChannelEvent>,
) -> bool {
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event_type: Option<&str> = None;

    for line in event_block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        }
        // `id:`, `retry:` and `:` comment lines carry nothing we use.
    }

    if event_type.is_none() && data_lines.is_empty() {
        return false;
    }

    let data = data_lines.join("\n");
    let event = StreamEvent::from_sse(event_type, &data);
    let terminal = matches!(event, StreamEvent::Finished | StreamEvent::Error(_));
    let _ = event_tx.send(ChannelEvent::new(exchange, event));
    terminal
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event.event);
        }
        events
    }

    /// `new()` rejects an invalid base URL.
    #[test]
    fn test_new_rejects_invalid_url() {
        assert!(HttpStreamChannel::new("not a url", Duration::from_secs(1)).is_err());
    }

    /// `events()` returns a stream that is initially empty.
    #[tokio::test]
    async fn test_events_initially_empty() {
        let channel = HttpStreamChannel::new("http://localhost:9999", Duration::from_secs(1)).unwrap();
        let mut stream = channel.events();
        let result = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(result.is_err(), "expected timeout on empty event stream");
    }

    /// Events are classified and tagged with the exchange id.
    #[tokio::test]
    async fn test_parse_sse_classifies_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let body = concat!(
            "event: metadata\ndata: {\"run_id\":\"r1\"}\n\n",
            "event: updates\ndata: {\"save_state\":true}\n\n",
            "event: end\ndata: null\n\n",
        );
        let byte_stream = futures::stream::iter(vec![Ok(Bytes::from(body))]);

        let terminated = parse_sse_stream(byte_stream, ExchangeId(3), tx).await;

        assert!(terminated);
        let first = rx.try_recv().unwrap();
        assert_eq!(first.exchange, ExchangeId(3));
        assert!(matches!(first.event, StreamEvent::Acknowledged { .. }));
        let rest = drain(&mut rx);
        assert!(matches!(rest[0], StreamEvent::Update(_)));
        assert_eq!(rest[1], StreamEvent::Finished);
    }

    /// An event split across chunks is reassembled.
    #[tokio::test]
    async fn test_parse_sse_reassembles_split_chunks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let chunks = vec![
            Ok(Bytes::from("event: upd")),
            Ok(Bytes::from("ates\ndata: {\"generate_title\":")),
            Ok(Bytes::from("{\"titles\":\"x\"}}\r\n\r\n")),
        ];

        let terminated = parse_sse_stream(futures::stream::iter(chunks), ExchangeId(1), tx).await;

        assert!(!terminated);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Update(update) => assert!(update.contains_key("generate_title")),
            other => panic!("expected update, got {other:?}"),
        }
    }

    /// A chunk boundary inside a multi-byte character or a CRLF pair loses nothing.
    #[tokio::test]
    async fn test_parse_sse_split_inside_utf8_character() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let body = "event: messages\r\ndata: [{\"type\":\"ai\",\"content\":\"你好\",\"id\":\"a1\"},{}]\r\n\r\nevent: end\r\ndata: null\r\n\r\n";
        let bytes = body.as_bytes();
        let cut = body.find("你").unwrap() + 1;
        let crlf = body.find("\r\n\r\nevent: end").unwrap() + 1;
        let chunks = vec![
            Ok(Bytes::copy_from_slice(&bytes[..cut])),
            Ok(Bytes::copy_from_slice(&bytes[cut..crlf])),
            Ok(Bytes::copy_from_slice(&bytes[crlf..])),
        ];

        let terminated = parse_sse_stream(futures::stream::iter(chunks), ExchangeId(2), tx).await;

        assert!(terminated);
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                StreamEvent::MessageDelta {
                    id: Some("a1".to_string()),
                    role: crate::session::message::Role::Agent,
                    content: crate::session::message::MessageContent::from("你好"),
                },
                StreamEvent::Finished,
            ]
        );
    }

    /// Only the single space after `data:` is removed.
    #[tokio::test]
    async fn test_parse_sse_keeps_data_whitespace() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let body = "event: error\ndata:   indented failure  \n\n";

        parse_sse_stream(futures::stream::iter(vec![Ok(Bytes::from(body))]), ExchangeId(1), tx)
            .await;

        assert_eq!(
            drain(&mut rx),
            vec![StreamEvent::Error("  indented failure  ".to_string())]
        );
    }

    /// Parsing stops at the first terminal event.
    #[tokio::test]
    async fn test_parse_sse_stops_after_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let body = "event: error\ndata: {\"message\":\"quota\"}\n\nevent: updates\ndata: {}\n\n";

        let terminated =
            parse_sse_stream(futures::stream::iter(vec![Ok(Bytes::from(body))]), ExchangeId(1), tx)
                .await;

        assert!(terminated);
        assert_eq!(drain(&mut rx), vec![StreamEvent::Error("quota".to_string())]);
    }

    /// Comment-only blocks are skipped.
    #[tokio::test]
    async fn test_parse_sse_ignores_comments() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let body = ": keep-alive\n\n";

        parse_sse_stream(futures::stream::iter(vec![Ok(Bytes::from(body))]), ExchangeId(1), tx)
            .await;

        assert!(drain(&mut rx).is_empty());
    }
}
