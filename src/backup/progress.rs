//! Newline-delimited JSON progress protocol.
//!
//! The server writes one `{"step": ..., "message": ...}` object per line while a
//! backup or restore runs. Progress is best-effort: a line that fails to parse is
//! dropped, only the response status and the reserved `error` step decide the
//! outcome.

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Step name reserved for failures reported after the response has started.
pub const ERROR_STEP: &str = "error";
pub const COMPLETE_STEP: &str = "complete";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: String,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ERROR_STEP, message)
    }

    pub fn is_error(&self) -> bool {
        self.step == ERROR_STEP
    }

    /// Encodes the event as a single NDJSON line, trailing newline included.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::json!({ "step": self.step, "message": self.message })
            .to_string();
        line.push('\n');
        line
    }
}

/// Incremental line splitter for a chunked progress body.
///
/// Bytes are buffered until a `\n` arrives, so multi-byte UTF-8 sequences split
/// across chunks decode correctly.
#[derive(Debug, Default)]
pub struct ProgressDecoder {
    buffer: Vec<u8>,
}

impl ProgressDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the events completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProgressEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Bytes of an unterminated trailing line.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn parse_line(line: &[u8]) -> Option<ProgressEvent> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<ProgressEvent>(text) {
        Ok(event) => Some(event),
        Err(err) => {
            debug!("Skipping malformed progress line ({}): {:?}", err, text);
            None
        }
    }
}

struct DecodeState<S> {
    chunks: S,
    decoder: ProgressDecoder,
    pending: VecDeque<ProgressEvent>,
    finished: bool,
}

/// Adapts a stream of body chunks into the lazy, ordered sequence of progress
/// events it carries.
///
/// The sequence ends with the body; an unterminated trailing line is discarded.
/// A transport error is yielded once and ends the sequence.
pub fn progress_events<S, B, E>(chunks: S) -> impl Stream<Item = Result<ProgressEvent, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = DecodeState {
        chunks,
        decoder: ProgressDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    if state.decoder.pending_len() > 0 {
                        debug!(
                            "Discarding {} bytes of unterminated progress output",
                            state.decoder.pending_len()
                        );
                    }
                    state.finished = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn decoder_buffers_partial_lines() {
        let mut decoder = ProgressDecoder::new();
        assert!(decoder.push(br#"{"step":"database","mess"#).is_empty());
        let events = decoder.push(b"age\":\"Exporting beats\"}\n{\"step\":");
        assert_eq!(events, vec![ProgressEvent::new("database", "Exporting beats")]);
        assert!(decoder.pending_len() > 0);
    }

    #[test]
    fn decoder_handles_utf8_split_across_chunks() {
        let line = ProgressEvent::new("files", "Añadiendo carátula").to_line();
        let bytes = line.as_bytes();
        let split = line.find('ñ').unwrap() + 1;

        let mut decoder = ProgressDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let events = decoder.push(&bytes[split..]);
        assert_eq!(events[0].message, "Añadiendo carátula");
    }

    #[tokio::test]
    async fn malformed_line_does_not_stop_the_stream() {
        let body = chunks(&[
            "{\"step\":\"start\",\"message\":\"one\"}\n",
            "{not json at all\n",
            "{\"step\":\"complete\",\"message\":\"two\"}\n",
        ]);
        let events: Vec<_> = progress_events(body)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                ProgressEvent::new("start", "one"),
                ProgressEvent::new("complete", "two"),
            ]
        );
    }

    #[tokio::test]
    async fn unterminated_trailing_line_is_dropped() {
        let body = chunks(&[
            "{\"step\":\"start\",\"message\":\"a\"}\n\n",
            "{\"step\":\"late\",\"message\":\"b\"}",
        ]);
        let events: Vec<_> = progress_events(body).collect().await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn transport_error_ends_the_sequence() {
        let body = stream::iter(vec![
            Ok(b"{\"step\":\"start\",\"message\":\"a\"}\n".to_vec()),
            Err("connection reset"),
            Ok(b"{\"step\":\"never\",\"message\":\"b\"}\n".to_vec()),
        ]);
        let events: Vec<_> = progress_events(body).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert_eq!(events[1], Err("connection reset"));
    }

    #[test]
    fn error_step_round_trips_through_a_line() {
        let line = ProgressEvent::error("disk full").to_line();
        assert!(line.ends_with('\n'));
        let mut decoder = ProgressDecoder::new();
        let events = decoder.push(line.as_bytes());
        assert!(events[0].is_error());
    }
}
