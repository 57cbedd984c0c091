//! Loop runner - the work/feedback cycle.
//!
//! Each cycle:
//! 1. Sends the full conversation and streams the answer (work turn)
//! 2. Appends the answer as an assistant message
//! 3. Sends `[seed, latest answer, feedback prompt]` and streams the judgment
//! 4. Appends the judgment as a user message
//! 5. Stops if the judgment is the sentinel, otherwise goes again
//!
//! The judgment lands in the conversation as a user turn, so the next work
//! turn sees it as the operator's critique of the previous attempt.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use super::accumulator::{TurnResult, consume};
use super::sink::{OutputSink, Phase};
use crate::conversation::Conversation;
use crate::error::{Result, SquaredError};
use crate::llm::{Message, ModelBackend};
use crate::validation::JudgeCriteria;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The judge replied with the sentinel
    Approved { attempts: u32 },
    /// The operator cancelled the loop
    Interrupted { attempts: u32 },
    /// The configured attempt cap was reached without approval
    Exhausted { attempts: u32 },
}

impl LoopOutcome {
    /// Completed work+feedback cycles
    pub fn attempts(&self) -> u32 {
        match self {
            LoopOutcome::Approved { attempts }
            | LoopOutcome::Interrupted { attempts }
            | LoopOutcome::Exhausted { attempts } => *attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Running,
    Stopped,
}

/// Counters mutated once per full cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopState {
    pub attempts: u32,
    pub done: bool,
}

/// Configuration for the LoopRunner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Model identifier passed through to the backend
    pub model: String,
    /// Feedback prompt and approval sentinel
    pub criteria: JudgeCriteria,
    /// Stop with `Exhausted` after this many cycles; `None` runs until approval
    pub max_attempts: Option<u32>,
    /// Pause between cycles
    pub cycle_delay: Duration,
}

impl RunnerConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            criteria: JudgeCriteria::default(),
            max_attempts: None,
            cycle_delay: Duration::ZERO,
        }
    }

    pub fn with_criteria(mut self, criteria: JudgeCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_cycle_delay(mut self, cycle_delay: Duration) -> Self {
        self.cycle_delay = cycle_delay;
        self
    }
}

/// Drives one self-critiquing loop to approval, interruption or exhaustion.
pub struct LoopRunner<B>
where
    B: ModelBackend,
{
    backend: Arc<B>,
    config: RunnerConfig,
    conversation: Conversation,
    state: LoopState,
    status: LoopStatus,
    interrupt: CancellationToken,
}

impl<B> LoopRunner<B>
where
    B: ModelBackend,
{
    /// Create a runner seeded with the task prompt.
    pub fn new(backend: Arc<B>, config: RunnerConfig, seed: impl Into<String>, interrupt: CancellationToken) -> Self {
        Self {
            backend,
            config,
            conversation: Conversation::new(seed),
            state: LoopState::default(),
            status: LoopStatus::Running,
            interrupt,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run cycles until the loop stops.
    ///
    /// Interruption is reported as [`LoopOutcome::Interrupted`], not as an
    /// error. A backend failure aborts the run with `Err`; messages appended
    /// by completed steps are kept, the failed turn appends nothing. A
    /// stopped runner refuses to run again.
    pub async fn run(&mut self, sink: &mut dyn OutputSink) -> Result<LoopOutcome> {
        if self.status == LoopStatus::Stopped {
            return Err(SquaredError::InvalidState("loop already stopped".to_string()));
        }

        info!(
            "loop starting: backend={} model={} max_attempts={:?}",
            self.backend.name(),
            self.config.model,
            self.config.max_attempts
        );

        let result = self.drive(sink).await;
        self.status = LoopStatus::Stopped;

        match result {
            Ok(outcome) => {
                info!("loop stopped: {:?}", outcome);
                Ok(outcome)
            }
            Err(SquaredError::Interrupted) => {
                info!("loop interrupted after {} attempts", self.state.attempts);
                Ok(LoopOutcome::Interrupted {
                    attempts: self.state.attempts,
                })
            }
            Err(e) => {
                warn!("loop failed after {} attempts: {}", self.state.attempts, e);
                Err(e)
            }
        }
    }

    async fn drive(&mut self, sink: &mut dyn OutputSink) -> Result<LoopOutcome> {
        loop {
            if let Some(max) = self.config.max_attempts
                && self.state.attempts >= max
            {
                return Ok(LoopOutcome::Exhausted {
                    attempts: self.state.attempts,
                });
            }

            if self.cycle(sink).await? {
                return Ok(LoopOutcome::Approved {
                    attempts: self.state.attempts,
                });
            }

            self.pause().await?;
        }
    }

    /// One work+feedback cycle. Returns whether the judge approved.
    async fn cycle(&mut self, sink: &mut dyn OutputSink) -> Result<bool> {
        let attempt = self.state.attempts + 1;

        self.check_interrupt()?;
        debug!("attempt {}: work turn over {} messages", attempt, self.conversation.len());
        sink.phase_started(Phase::Work, attempt);
        let work = self.turn(self.conversation.all(), sink).await?;
        self.conversation.append(Message::assistant(work.content));

        self.check_interrupt()?;
        debug!("attempt {}: feedback turn", attempt);
        sink.phase_started(Phase::Feedback, attempt);
        let window = self.conversation.feedback_window(&self.config.criteria.prompt);
        let feedback = self.turn(&window, sink).await?;

        let approved = self.config.criteria.is_approved(&feedback.content);
        self.conversation.append(Message::user(feedback.content));
        self.state.attempts = attempt;
        if approved {
            self.state.done = true;
        }

        info!("attempt {} judged: approved={}", attempt, approved);
        Ok(approved)
    }

    /// Request one generation and drain it; interruptible while connecting and streaming.
    async fn turn(&self, history: &[Message], sink: &mut dyn OutputSink) -> Result<TurnResult> {
        let stream = tokio::select! {
            biased;
            _ = self.interrupt.cancelled() => return Err(SquaredError::Interrupted),
            stream = self.backend.generate(&self.config.model, history) => stream?,
        };
        consume(stream, sink, &self.interrupt).await
    }

    async fn pause(&self) -> Result<()> {
        if self.config.cycle_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.interrupt.cancelled() => Err(SquaredError::Interrupted),
            _ = tokio::time::sleep(self.config.cycle_delay) => Ok(()),
        }
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.is_cancelled() {
            Err(SquaredError::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockBackend, Role, ScriptedTurn, StreamFragment};
    use crate::runner::sink::{NullSink, RecordingSink, SinkEvent};

    fn runner(mock: MockBackend, seed: &str) -> (Arc<MockBackend>, LoopRunner<MockBackend>) {
        let backend = Arc::new(mock);
        let runner = LoopRunner::new(
            backend.clone(),
            RunnerConfig::new("test-model"),
            seed,
            CancellationToken::new(),
        );
        (backend, runner)
    }

    #[test]
    fn test_loop_outcome_attempts() {
        assert_eq!(LoopOutcome::Approved { attempts: 3 }.attempts(), 3);
        assert_eq!(LoopOutcome::Interrupted { attempts: 0 }.attempts(), 0);
        assert_eq!(LoopOutcome::Exhausted { attempts: 5 }.attempts(), 5);
    }

    #[test]
    fn test_runner_config_defaults() {
        let config = RunnerConfig::new("gpt-oss:20b");
        assert_eq!(config.model, "gpt-oss:20b");
        assert_eq!(config.criteria, JudgeCriteria::default());
        assert!(config.max_attempts.is_none());
        assert!(config.cycle_delay.is_zero());
    }

    #[test]
    fn test_initial_state() {
        let (_, runner) = runner(MockBackend::new(), "P");
        assert_eq!(runner.state(), LoopState::default());
        assert_eq!(runner.status(), LoopStatus::Running);
        assert_eq!(runner.conversation().all(), &[Message::user("P")]);
    }

    #[tokio::test]
    async fn test_approved_on_first_cycle() {
        let (_, mut runner) = runner(MockBackend::with_answers(["42", "DONE"]), "P");

        let outcome = runner.run(&mut NullSink).await.unwrap();

        assert_eq!(outcome, LoopOutcome::Approved { attempts: 1 });
        assert_eq!(
            runner.conversation().all(),
            &[Message::user("P"), Message::assistant("42"), Message::user("DONE")]
        );
        assert!(runner.state().done);
        assert_eq!(runner.status(), LoopStatus::Stopped);
    }

    #[tokio::test]
    async fn test_feedback_flows_into_next_work_turn() {
        let mock = MockBackend::with_answers(["draft", "Nice structure. Needs more detail.", "final", "DONE"]);
        let (backend, mut runner) = runner(mock, "P");

        let outcome = runner.run(&mut NullSink).await.unwrap();
        assert_eq!(outcome.attempts(), 2);

        let requests = backend.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|(model, _)| model == "test-model"));

        // second work turn sees the whole history including the critique
        let second_work = &requests[2].1;
        assert_eq!(second_work.len(), 3);
        assert_eq!(second_work[2], Message::user("Nice structure. Needs more detail."));
    }

    #[tokio::test]
    async fn test_feedback_request_is_three_message_window() {
        let mock = MockBackend::with_answers(["a1", "no", "a2", "no", "a3", "DONE"]);
        let (backend, mut runner) = runner(mock, "P");
        runner.run(&mut NullSink).await.unwrap();

        let requests = backend.requests();
        let feedback_requests: Vec<_> = requests.iter().skip(1).step_by(2).collect();
        assert_eq!(feedback_requests.len(), 3);
        for (i, (_, window)) in feedback_requests.iter().enumerate() {
            assert_eq!(window.len(), 3);
            assert_eq!(window[0], Message::user("P"));
            assert_eq!(window[1], Message::assistant(format!("a{}", i + 1)));
            assert_eq!(window[2].role, Role::User);
            assert_eq!(window[2].content, JudgeCriteria::default().prompt);
        }
    }

    #[tokio::test]
    async fn test_history_grows_two_per_rejected_cycle() {
        let mock = MockBackend::with_answers(["a", "no", "b", "no", "c", "no"]);
        let backend = Arc::new(mock);
        let mut runner = LoopRunner::new(
            backend,
            RunnerConfig::new("m").with_max_attempts(Some(3)),
            "P",
            CancellationToken::new(),
        );

        let outcome = runner.run(&mut NullSink).await.unwrap();

        assert_eq!(outcome, LoopOutcome::Exhausted { attempts: 3 });
        assert_eq!(runner.conversation().len(), 1 + 2 * 3);
        assert!(!runner.state().done);
    }

    #[tokio::test]
    async fn test_all_reasoning_work_turn_appends_empty_message() {
        let mock = MockBackend::new()
            .turn(ScriptedTurn::Fragments(vec![StreamFragment::reasoning("only thinking")]))
            .answer("DONE");
        let (_, mut runner) = runner(mock, "P");

        let outcome = runner.run(&mut NullSink).await.unwrap();

        assert_eq!(outcome, LoopOutcome::Approved { attempts: 1 });
        assert_eq!(runner.conversation().all()[1], Message::assistant(""));
    }

    #[tokio::test]
    async fn test_reasoning_never_enters_history() {
        let mock = MockBackend::new()
            .turn(ScriptedTurn::Fragments(vec![
                StreamFragment::reasoning("secret plan"),
                StreamFragment::answer("42"),
            ]))
            .answer("DONE");
        let (_, mut runner) = runner(mock, "P");
        let mut sink = RecordingSink::new();

        runner.run(&mut sink).await.unwrap();

        assert!(runner.conversation().all().iter().all(|m| !m.content.contains("secret")));
        assert_eq!(sink.count(|e| matches!(e, SinkEvent::Reasoning(_))), 1);
        assert_eq!(sink.count(|e| matches!(e, SinkEvent::PhaseStarted(_, 1))), 2);
    }

    #[tokio::test]
    async fn test_interrupt_during_feedback_keeps_only_work_turn() {
        let token = CancellationToken::new();
        let mock = MockBackend::new()
            .answer("42")
            .turn(ScriptedTurn::Interrupt)
            .with_interrupt(token.clone());
        let mut runner = LoopRunner::new(Arc::new(mock), RunnerConfig::new("m"), "P", token);

        let outcome = runner.run(&mut NullSink).await.unwrap();

        assert_eq!(outcome, LoopOutcome::Interrupted { attempts: 0 });
        assert_eq!(runner.conversation().len(), 2);
        assert_eq!(runner.conversation().last(), &Message::assistant("42"));
    }

    #[tokio::test]
    async fn test_interrupt_before_start_makes_no_requests() {
        let token = CancellationToken::new();
        token.cancel();
        let backend = Arc::new(MockBackend::with_answers(["unused"]));
        let mut runner = LoopRunner::new(backend.clone(), RunnerConfig::new("m"), "P", token);

        let outcome = runner.run(&mut NullSink).await.unwrap();

        assert_eq!(outcome, LoopOutcome::Interrupted { attempts: 0 });
        assert!(backend.requests().is_empty());
        assert_eq!(runner.conversation().len(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_during_pause_between_cycles() {
        let token = CancellationToken::new();
        let mock = MockBackend::with_answers(["a", "not yet"]);
        let mut runner = LoopRunner::new(
            Arc::new(mock),
            RunnerConfig::new("m").with_cycle_delay(Duration::from_secs(3600)),
            "P",
            token.clone(),
        );

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let outcome = runner.run(&mut NullSink).await.unwrap();
        assert_eq!(outcome, LoopOutcome::Interrupted { attempts: 1 });
        assert_eq!(runner.conversation().len(), 3);
    }

    #[tokio::test]
    async fn test_backend_failure_on_feedback_aborts_without_partial_append() {
        let mock = MockBackend::new().answer("42").turn(ScriptedTurn::Failure {
            fragments: vec![StreamFragment::answer("DO")],
            message: "connection reset".to_string(),
        });
        let (_, mut runner) = runner(mock, "P");

        let result = runner.run(&mut NullSink).await;

        assert!(matches!(result, Err(SquaredError::BackendStream(_))));
        assert_eq!(runner.conversation().len(), 2);
        assert_eq!(runner.state().attempts, 0);
        assert_eq!(runner.status(), LoopStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stopped_runner_refuses_to_run_again() {
        let (backend, mut runner) = runner(MockBackend::with_answers(["42", "DONE", "extra"]), "P");
        runner.run(&mut NullSink).await.unwrap();

        let again = runner.run(&mut NullSink).await;

        assert!(matches!(again, Err(SquaredError::InvalidState(_))));
        assert_eq!(backend.remaining(), 1);
    }

    #[tokio::test]
    async fn test_custom_sentinel() {
        let mock = MockBackend::with_answers(["42", "DONE", "43", "APPROVED"]);
        let backend = Arc::new(mock);
        let config = RunnerConfig::new("m").with_criteria(JudgeCriteria::new("reply APPROVED", "approved"));
        let mut runner = LoopRunner::new(backend, config, "P", CancellationToken::new());

        let outcome = runner.run(&mut NullSink).await.unwrap();
        assert_eq!(outcome, LoopOutcome::Approved { attempts: 2 });
    }
}
