//! services/api/src/web/relay.rs
//!
//! Relays a streamed chat completion to the browser.
//!
//! The upstream body is a line-oriented event stream (`data: <json>` lines,
//! terminated by `data: [DONE]`). Each content delta is re-framed as a
//! `StreamFrame` and pushed to the response channel as soon as it arrives,
//! while the full text is accumulated for the activity log.

use crate::web::protocol::StreamFrame;
use bytes::BytesMut;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use sugoroku_core::ports::CompletionByteStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Prefix of an event line carrying a payload.
pub const EVENT_MARKER: &str = "data:";
/// Payload that marks the end of the upstream stream.
pub const DONE_SENTINEL: &str = "[DONE]";

//=========================================================================================
// Line Splitting
//=========================================================================================

/// Splits a chunked byte stream into lines. A line may straddle chunk
/// boundaries, including in the middle of a multi-byte character.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: BytesMut,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// The next complete line, without its `\n` / `\r\n` terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|b| *b == b'\n')?;
        let line = self.buf.split_to(end + 1);
        Some(decode_line(&line[..end]))
    }

    /// Whatever is left once the stream has ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        Some(decode_line(&rest))
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end_matches('\r').to_string()
}

//=========================================================================================
// Event Parsing
//=========================================================================================

/// The part of an OpenAI chat-completion chunk the relay cares about.
#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// What one upstream line means for the relay.
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    Content(String),
    Done,
    /// An event line whose payload is not valid JSON.
    Malformed,
    /// Blank lines, comments, other fields, and chunks without text.
    Ignored,
}

pub fn classify_line(line: &str) -> LineEvent {
    let Some(payload) = line.strip_prefix(EVENT_MARKER) else {
        return LineEvent::Ignored;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return LineEvent::Done;
    }

    match serde_json::from_str::<CompletionChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(LineEvent::Content)
            .unwrap_or(LineEvent::Ignored),
        Err(e) => {
            debug!("Skipping malformed upstream frame: {}", e);
            LineEvent::Malformed
        }
    }
}

//=========================================================================================
// The Relay
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Streaming,
    Done,
    Error,
}

/// Why the relay stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// The upstream sent the completion sentinel.
    Sentinel,
    /// The upstream body ended without the sentinel.
    UpstreamClosed,
    UpstreamFailed(String),
    /// No upstream chunk arrived within the idle timeout.
    IdleTimeout,
    /// The response channel was closed, i.e. the client went away.
    ClientGone,
}

impl RelayEnd {
    pub fn state(&self) -> RelayState {
        match self {
            RelayEnd::Sentinel => RelayState::Done,
            _ => RelayState::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub end: RelayEnd,
    /// Concatenation of every content frame the client accepted.
    pub text: String,
    pub forwarded: usize,
    pub malformed: usize,
}

struct Relay {
    sink: mpsc::Sender<StreamFrame>,
    text: String,
    forwarded: usize,
    malformed: usize,
}

impl Relay {
    /// Handles one line; `Some` ends the relay.
    async fn handle_line(&mut self, line: &str) -> Option<RelayEnd> {
        match classify_line(line) {
            LineEvent::Done => Some(RelayEnd::Sentinel),
            LineEvent::Malformed => {
                self.malformed += 1;
                None
            }
            LineEvent::Ignored => None,
            LineEvent::Content(data) => {
                let frame = StreamFrame::Content { data: data.clone() };
                if self.sink.send(frame).await.is_err() {
                    return Some(RelayEnd::ClientGone);
                }
                self.text.push_str(&data);
                self.forwarded += 1;
                None
            }
        }
    }
}

/// Runs the relay until the sentinel, the end of the upstream, an upstream
/// error, an idle timeout, or a closed `sink`. Dropping `sink` on return
/// ends the client's stream.
pub async fn relay_completion(
    mut upstream: CompletionByteStream,
    sink: mpsc::Sender<StreamFrame>,
    idle_timeout: Duration,
) -> RelayOutcome {
    let mut relay = Relay {
        sink,
        text: String::new(),
        forwarded: 0,
        malformed: 0,
    };
    let mut lines = LineSplitter::new();

    let end = 'read: loop {
        let next = match tokio::time::timeout(idle_timeout, upstream.next()).await {
            Ok(next) => next,
            Err(_) => break RelayEnd::IdleTimeout,
        };

        match next {
            Some(Ok(chunk)) => {
                lines.push(&chunk);
                while let Some(line) = lines.next_line() {
                    if let Some(end) = relay.handle_line(&line).await {
                        break 'read end;
                    }
                }
            }
            Some(Err(e)) => break RelayEnd::UpstreamFailed(e.to_string()),
            None => {
                if let Some(line) = lines.finish() {
                    if let Some(end) = relay.handle_line(&line).await {
                        break end;
                    }
                }
                break RelayEnd::UpstreamClosed;
            }
        }
    };

    if end.state() == RelayState::Error {
        warn!(
            "Answer stream ended early ({:?}) after {} frames",
            end, relay.forwarded
        );
    }

    RelayOutcome {
        end,
        text: relay.text,
        forwarded: relay.forwarded,
        malformed: relay.malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use sugoroku_core::ports::{PortError, PortResult};

    fn content_line(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": text } }] })
        )
    }

    fn upstream_of(chunks: Vec<PortResult<Bytes>>) -> CompletionByteStream {
        Box::pin(stream::iter(chunks))
    }

    fn ok(s: impl Into<String>) -> PortResult<Bytes> {
        Ok(Bytes::from(s.into()))
    }

    async fn run(chunks: Vec<PortResult<Bytes>>) -> (RelayOutcome, Vec<StreamFrame>) {
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = relay_completion(upstream_of(chunks), tx, Duration::from_secs(5)).await;
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        (outcome, frames)
    }

    fn content(text: &str) -> StreamFrame {
        StreamFrame::Content {
            data: text.to_string(),
        }
    }

    #[tokio::test]
    async fn forwards_content_in_order_and_stops_at_sentinel() {
        let (outcome, frames) = run(vec![
            ok(content_line("A")),
            ok(content_line("B")),
            ok("data: [DONE]\n\n"),
            ok(content_line("after the end")),
        ])
        .await;

        assert_eq!(frames, vec![content("A"), content("B")]);
        assert_eq!(outcome.end, RelayEnd::Sentinel);
        assert_eq!(outcome.end.state(), RelayState::Done);
        assert_eq!(outcome.text, "AB");
        assert_eq!(outcome.forwarded, 2);
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let (outcome, frames) = run(vec![
            ok(content_line("A")),
            ok("data: {not json\n"),
            ok(content_line("B")),
            ok("data: [DONE]\n"),
        ])
        .await;

        assert_eq!(frames, vec![content("A"), content("B")]);
        assert_eq!(outcome.text, "AB");
        assert_eq!(outcome.malformed, 1);
        assert_eq!(outcome.end, RelayEnd::Sentinel);
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let line = content_line("パン");
        let bytes = line.as_bytes();
        // Cut inside the multi-byte "パ".
        let cut = line.find("パ").unwrap() + 1;
        let (outcome, frames) = run(vec![
            Ok(Bytes::copy_from_slice(&bytes[..cut])),
            Ok(Bytes::copy_from_slice(&bytes[cut..])),
            ok("data: [DO"),
            ok("NE]\n"),
        ])
        .await;

        assert_eq!(frames, vec![content("パン")]);
        assert_eq!(outcome.end, RelayEnd::Sentinel);
    }

    #[tokio::test]
    async fn upstream_close_without_sentinel_is_an_error_end() {
        let (outcome, frames) = run(vec![ok(content_line("A"))]).await;
        assert_eq!(frames, vec![content("A")]);
        assert_eq!(outcome.end, RelayEnd::UpstreamClosed);
        assert_eq!(outcome.end.state(), RelayState::Error);
        assert_eq!(outcome.text, "A");
    }

    #[tokio::test]
    async fn trailing_sentinel_without_newline_is_honoured() {
        let (outcome, _) = run(vec![ok(content_line("A")), ok("data: [DONE]")]).await;
        assert_eq!(outcome.end, RelayEnd::Sentinel);
    }

    #[tokio::test]
    async fn upstream_error_keeps_what_was_relayed() {
        let (outcome, frames) = run(vec![
            ok(content_line("A")),
            Err(PortError::Unexpected("connection reset".into())),
            ok(content_line("B")),
        ])
        .await;
        assert_eq!(frames, vec![content("A")]);
        assert!(matches!(outcome.end, RelayEnd::UpstreamFailed(_)));
        assert_eq!(outcome.text, "A");
    }

    #[tokio::test]
    async fn closed_client_stops_reading() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        // An endless upstream: the relay must stop on the failed send.
        let endless = stream::repeat_with(|| ok(content_line("x")));
        let outcome = relay_completion(Box::pin(endless), tx, Duration::from_secs(5)).await;
        assert_eq!(outcome.end, RelayEnd::ClientGone);
        assert_eq!(outcome.forwarded, 0);
        assert_eq!(outcome.text, "");
    }

    #[tokio::test]
    async fn silent_upstream_hits_idle_timeout() {
        let (tx, _rx) = mpsc::channel(4);
        let silent = stream::pending::<PortResult<Bytes>>();
        let outcome = relay_completion(Box::pin(silent), tx, Duration::from_millis(20)).await;
        assert_eq!(outcome.end, RelayEnd::IdleTimeout);
    }

    #[test]
    fn classify_ignores_non_event_lines_and_empty_deltas() {
        assert_eq!(classify_line(""), LineEvent::Ignored);
        assert_eq!(classify_line(": keep-alive"), LineEvent::Ignored);
        assert_eq!(
            classify_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            LineEvent::Ignored
        );
        assert_eq!(
            classify_line(r#"data:{"choices":[{"delta":{"content":"hi"}}]}"#),
            LineEvent::Content("hi".to_string())
        );
        assert_eq!(classify_line("data: [DONE]"), LineEvent::Done);
    }

    #[test]
    fn splitter_strips_carriage_returns() {
        let mut lines = LineSplitter::new();
        lines.push(b"one\r\ntwo\npartial");
        assert_eq!(lines.next_line().as_deref(), Some("one"));
        assert_eq!(lines.next_line().as_deref(), Some("two"));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.finish().as_deref(), Some("partial"));
        assert_eq!(lines.finish(), None);
    }
}
