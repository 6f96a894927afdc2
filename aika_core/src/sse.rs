//! Line-framed server-sent events for `/chat/stream`.
//!
//! The backend writes one JSON [`StreamEvent`] per `data: ` line. Lines are
//! only decoded once a `\n` boundary arrives, so a UTF-8 sequence or JSON
//! object split across network reads is reassembled before parsing. A
//! malformed line is logged and skipped; it never ends the stream.

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

use crate::api::{StreamEvent, StreamEventStream};
use crate::error::ChatError;

pub const DATA_PREFIX: &str = "data: ";

/// Incremental decoder from raw body bytes to stream events.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read, returning every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }

        events
    }

    /// Flush the trailing partial line at end of stream.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

fn decode_line(raw: &[u8]) -> Option<StreamEvent> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!("Skipping non-UTF-8 SSE line: {}", e);
            return None;
        }
    };

    let payload = line.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(
                "Failed to parse SSE data ({}): {}",
                e,
                payload.chars().take(200).collect::<String>()
            );
            None
        }
    }
}

/// Parse a complete SSE body held in memory.
pub fn parse_sse_text(text: &str) -> Vec<StreamEvent> {
    let mut decoder = SseLineDecoder::new();
    let mut events = decoder.push(text.as_bytes());
    events.extend(decoder.finish());
    events
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: SseLineDecoder,
    ready: VecDeque<StreamEvent>,
    finished: bool,
}

/// Adapt a byte stream (e.g. `reqwest::Response::bytes_stream`) into a lazy,
/// single-pass sequence of events.
///
/// A read error is yielded once as `Err` and ends the sequence.
pub fn event_stream<S, E>(body: S) -> StreamEventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseLineDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    let events = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    state.ready.extend(state.decoder.push(&chunk));
                }
                Some(Err(error)) => {
                    state.finished = true;
                    return Some((Err(error.into()), state));
                }
                None => {
                    state.finished = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    });

    Box::pin(events)
}
