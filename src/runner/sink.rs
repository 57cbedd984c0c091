//! Output sinks - observers of streamed fragments.
//!
//! Sinks are purely presentational. The runner and accumulator call them as
//! fragments arrive; nothing they do feeds back into the conversation.

use std::fmt;
use std::io::{self, Write};

use colored::{Color, Colorize};

/// Which half of a cycle a turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Work,
    Feedback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Work => write!(f, "work"),
            Phase::Feedback => write!(f, "feedback"),
        }
    }
}

/// Observer of one loop's streamed output.
pub trait OutputSink: Send {
    /// A new turn is about to be requested. `attempt` is 1-based.
    fn phase_started(&mut self, _phase: Phase, _attempt: u32) {}

    /// Reasoning delta; shown, never stored.
    fn reasoning(&mut self, text: &str);

    /// The first answer delta of the turn is about to follow.
    fn answer_started(&mut self) {}

    /// Answer delta.
    fn answer(&mut self, text: &str);

    /// The turn's stream ended normally.
    fn turn_finished(&mut self) {}
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn reasoning(&mut self, _text: &str) {}

    fn answer(&mut self, _text: &str) {}
}

/// Everything a [`RecordingSink`] saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    PhaseStarted(Phase, u32),
    Reasoning(String),
    AnswerStarted,
    Answer(String),
    TurnFinished,
}

/// Sink that keeps every event, for tests and transcripts.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&SinkEvent) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

impl OutputSink for RecordingSink {
    fn phase_started(&mut self, phase: Phase, attempt: u32) {
        self.events.push(SinkEvent::PhaseStarted(phase, attempt));
    }

    fn reasoning(&mut self, text: &str) {
        self.events.push(SinkEvent::Reasoning(text.to_string()));
    }

    fn answer_started(&mut self) {
        self.events.push(SinkEvent::AnswerStarted);
    }

    fn answer(&mut self, text: &str) {
        self.events.push(SinkEvent::Answer(text.to_string()));
    }

    fn turn_finished(&mut self) {
        self.events.push(SinkEvent::TurnFinished);
    }
}

/// Colors used by [`TerminalSink`].
#[derive(Debug, Clone, Copy)]
pub struct TerminalStyle {
    pub header: Color,
    pub reasoning: Color,
    pub answer_marker: Color,
}

impl Default for TerminalStyle {
    fn default() -> Self {
        Self {
            header: Color::Cyan,
            reasoning: Color::BrightBlack,
            answer_marker: Color::Green,
        }
    }
}

/// Live terminal display: dimmed reasoning, plain answer text.
pub struct TerminalSink<W: Write + Send> {
    out: W,
    style: TerminalStyle,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout(style: TerminalStyle) -> Self {
        Self::new(io::stdout(), style)
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W, style: TerminalStyle) -> Self {
        Self { out, style }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    // Display only; a broken terminal must not abort the loop.
    fn emit(&mut self, text: impl fmt::Display) {
        let _ = write!(self.out, "{}", text);
        let _ = self.out.flush();
    }
}

impl<W: Write + Send> OutputSink for TerminalSink<W> {
    fn phase_started(&mut self, phase: Phase, attempt: u32) {
        let header = format!("\n── attempt {} · {} ──\n", attempt, phase);
        self.emit(header.color(self.style.header).bold());
    }

    fn reasoning(&mut self, text: &str) {
        self.emit(text.color(self.style.reasoning).italic());
    }

    fn answer_started(&mut self) {
        self.emit("\n» ".color(self.style.answer_marker));
    }

    fn answer(&mut self, text: &str) {
        self.emit(text);
    }

    fn turn_finished(&mut self) {
        self.emit("\n");
    }
}
