//! Streaming support for model responses.
//!
//! The backend delivers one generation as newline-delimited JSON objects. This
//! module turns that byte stream into a pull-based sequence of
//! [`StreamFragment`]s tagged as reasoning or answer text.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::client::LlmError;

/// What a fragment's text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    /// Model thinking; shown live, never stored
    Reasoning,
    /// Part of the turn's final content
    Answer,
    /// Anything else the backend tags a delta with
    #[serde(other)]
    Unknown,
}

/// One incremental text delta from a generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFragment {
    pub kind: FragmentKind,
    pub text: String,
}

impl StreamFragment {
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Reasoning,
            text: text.into(),
        }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Answer,
            text: text.into(),
        }
    }
}

/// Finite, single-pass sequence of fragments for one generation.
pub type FragmentStream = BoxStream<'static, Result<StreamFragment, LlmError>>;

/// One NDJSON object of a streamed chat response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub thinking: Option<String>,
}

impl ChatChunk {
    /// Parse a single NDJSON line.
    pub fn parse(line: &str) -> Result<Self, LlmError> {
        serde_json::from_str(line).map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, line)))
    }

    /// Split the chunk into fragments, thinking first.
    pub fn into_fragments(self) -> Result<Vec<StreamFragment>, LlmError> {
        if let Some(error) = self.error {
            return Err(LlmError::Backend(error));
        }

        let mut fragments = Vec::new();
        if let Some(message) = self.message {
            if let Some(thinking) = message.thinking
                && !thinking.is_empty()
            {
                fragments.push(StreamFragment::reasoning(thinking));
            }
            if !message.content.is_empty() {
                fragments.push(StreamFragment::answer(message.content));
            }
        }
        Ok(fragments)
    }
}

/// Reassembles lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line completed by them (blank lines skipped).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the input ends without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        if rest.is_empty() { None } else { Some(rest) }
    }
}

struct DecodeState<S> {
    inner: Pin<Box<S>>,
    lines: LineBuffer,
    pending: VecDeque<Result<StreamFragment, LlmError>>,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn absorb(&mut self, line: &str) {
        if self.finished {
            return;
        }
        let chunk = match ChatChunk::parse(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        let done = chunk.done;
        match chunk.into_fragments() {
            Ok(fragments) => self.pending.extend(fragments.into_iter().map(Ok)),
            Err(e) => {
                self.fail(e);
                return;
            }
        }
        if done {
            self.finished = true;
        }
    }

    fn fail(&mut self, error: LlmError) {
        self.pending.push_back(Err(error));
        self.finished = true;
    }
}

/// Decode an NDJSON chat response body into fragments.
///
/// The stream ends after the `done` object. An `error` object, an unparseable
/// line, a transport error, or a body that ends before `done` each yield one
/// final `Err` item.
pub fn decode_chat_stream<S, B, E>(inner: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<LlmError> + Send + 'static,
{
    let state = DecodeState {
        inner: Box::pin(inner),
        lines: LineBuffer::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.inner.next().await {
                Some(Ok(bytes)) => {
                    for line in state.lines.push(bytes.as_ref()) {
                        state.absorb(&line);
                    }
                }
                Some(Err(e)) => state.fail(e.into()),
                None => {
                    if let Some(rest) = state.lines.finish() {
                        state.absorb(&rest);
                    }
                    if !state.finished {
                        state.fail(LlmError::InvalidResponse(
                            "stream ended before the backend signalled completion".to_string(),
                        ));
                    }
                }
            }
        }
    })
    .boxed()
}
