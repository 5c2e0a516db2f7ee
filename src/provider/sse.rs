//! Server-sent event decoding shared by the web backend and the
//! OpenAI-compatible provider.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;

use super::PromptStream;
use crate::errors::StudioError;
use crate::wire::{ServerChunk, StreamEvent};

pub const DONE_MARKER: &str = "[DONE]";

/// Splits a byte stream into `data:` payloads. Lines (and UTF-8 sequences)
/// may arrive split across chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                out.push(payload);
            }
        }
        out
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buf);
        data_payload(&line).into_iter().collect()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(['\n', '\r']);
    let data = text.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).to_string())
}

/// Payload format of the web backend: `{"content": ..}` / `{"error": ..}`.
pub fn interpret_server(payload: &str) -> Option<Result<StreamEvent, StudioError>> {
    if payload == DONE_MARKER {
        return Some(Ok(StreamEvent::Done));
    }
    match serde_json::from_str::<ServerChunk>(payload) {
        Ok(ServerChunk { error: Some(e), .. }) => Some(Err(StudioError::Provider(e))),
        Ok(ServerChunk { content: Some(c), .. }) if !c.is_empty() => Some(Ok(StreamEvent::Chunk(c))),
        Ok(_) => None,
        Err(e) => {
            log::debug!("ignoring unparseable stream payload: {e}");
            None
        }
    }
}

/// Payload format of OpenAI-compatible chat completion streams.
pub fn interpret_openai(payload: &str) -> Option<Result<StreamEvent, StudioError>> {
    if payload == DONE_MARKER {
        return Some(Ok(StreamEvent::Done));
    }
    let json: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("ignoring unparseable stream payload: {e}");
            return None;
        }
    };
    if let Some(err) = json.get("error") {
        let msg = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Some(Err(StudioError::Provider(msg)));
    }
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| Ok(StreamEvent::Chunk(s.to_string())))
}

struct DecodeState<S, F> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    interpret: F,
    pending: VecDeque<Result<StreamEvent, StudioError>>,
    exhausted: bool,
}

/// Turn a raw byte stream into prompt events using `interpret` for payloads.
pub fn decode_stream<S, E, F>(bytes: S, interpret: F) -> PromptStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<StudioError> + Send + 'static,
    F: Fn(&str) -> Option<Result<StreamEvent, StudioError>> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        interpret,
        pending: VecDeque::new(),
        exhausted: false,
    };

    let stream = futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(ev) = st.pending.pop_front() {
                return Some((ev, st));
            }
            if st.exhausted {
                return None;
            }
            let payloads = match st.bytes.next().await {
                Some(Ok(chunk)) => st.decoder.push(&chunk),
                Some(Err(e)) => {
                    st.exhausted = true;
                    st.pending.push_back(Err(e.into()));
                    continue;
                }
                None => {
                    st.exhausted = true;
                    st.decoder.finish()
                }
            };
            for p in payloads {
                if let Some(ev) = (st.interpret)(&p) {
                    st.pending.push_back(ev);
                }
            }
        }
    });
    Box::pin(stream)
}
