//! Response accumulator - assembles one streamed turn.
//!
//! Reasoning deltas go to the sink only. Answer deltas go to the sink and the
//! buffer. Fragments of any other kind are dropped.

use futures::StreamExt;
use log::warn;
use tokio_util::sync::CancellationToken;

use super::sink::OutputSink;
use crate::error::{Result, SquaredError};
use crate::llm::{FragmentKind, FragmentStream, StreamFragment};

/// Final content of one generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnResult {
    pub content: String,
}

/// Buffers the answer text of a single turn.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    buffer: String,
    answer_started: bool,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one fragment.
    pub fn accept<S: OutputSink + ?Sized>(&mut self, fragment: StreamFragment, sink: &mut S) {
        match fragment.kind {
            FragmentKind::Reasoning => sink.reasoning(&fragment.text),
            FragmentKind::Answer => {
                if !self.answer_started {
                    self.answer_started = true;
                    sink.answer_started();
                }
                sink.answer(&fragment.text);
                self.buffer.push_str(&fragment.text);
            }
            FragmentKind::Unknown => {
                warn!("ignoring fragment of unknown kind ({} bytes)", fragment.text.len());
            }
        }
    }

    pub fn finish(self) -> TurnResult {
        TurnResult { content: self.buffer }
    }
}

/// Drain `stream` into a [`TurnResult`].
///
/// Returns [`SquaredError::Interrupted`] as soon as `interrupt` fires, even while
/// waiting on a pull, and [`SquaredError::BackendStream`] on the first stream
/// error. Neither produces a partial result.
pub async fn consume<S: OutputSink + ?Sized>(
    mut stream: FragmentStream,
    sink: &mut S,
    interrupt: &CancellationToken,
) -> Result<TurnResult> {
    let mut accumulator = ResponseAccumulator::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = interrupt.cancelled() => return Err(SquaredError::Interrupted),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(fragment)) => accumulator.accept(fragment, sink),
            Some(Err(e)) => return Err(e.into()),
            None => break,
        }
    }

    sink.turn_finished();
    Ok(accumulator.finish())
}
