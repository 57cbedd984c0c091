//! Loop runner module - the self-critiquing iteration engine.
//!
//! This module provides:
//! - LoopRunner for driving work/feedback cycles
//! - The response accumulator that assembles one streamed turn
//! - Output sinks that observe fragments as they arrive

pub mod accumulator;
mod loop_runner;
pub mod sink;

pub use accumulator::{ResponseAccumulator, TurnResult, consume};
pub use loop_runner::{LoopOutcome, LoopRunner, LoopState, LoopStatus, RunnerConfig};
pub use sink::{NullSink, OutputSink, Phase, RecordingSink, SinkEvent, TerminalSink, TerminalStyle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let outcome = LoopOutcome::Approved { attempts: 1 };
        assert!(matches!(outcome, LoopOutcome::Approved { .. }));
        assert_eq!(LoopState::default().attempts, 0);
    }
}
