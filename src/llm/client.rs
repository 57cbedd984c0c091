//! Core backend trait, its error type, and a scripted mock

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::streaming::{FragmentStream, StreamFragment};
use super::types::Message;

/// Stateless model backend - each call is independent, the full history is sent every time
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Start a streamed generation for `history` on `model`.
    ///
    /// Errors before the first fragment (connection refused, non-2xx status)
    /// are returned directly; errors after that arrive as stream items.
    async fn generate(&self, model: &str, history: &[Message]) -> Result<FragmentStream, LlmError>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}

/// Errors that can occur talking to a model backend
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// One scripted generation for [`MockBackend`].
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Stream these fragments, then end normally
    Fragments(Vec<StreamFragment>),
    /// Stream these fragments, then fail with a backend error
    Failure {
        fragments: Vec<StreamFragment>,
        message: String,
    },
    /// Cancel the attached token and never yield anything
    Interrupt,
}

/// Mock backend for testing - replays scripted turns in order and records requests
pub struct MockBackend {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<(String, Vec<Message>)>>,
    interrupt: Option<CancellationToken>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            interrupt: None,
        }
    }

    /// Build a mock from a list of plain answers, one per generation
    pub fn with_answers<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        answers.into_iter().fold(Self::new(), |mock, answer| mock.answer(answer))
    }

    /// Queue a turn that answers with a single fragment
    pub fn answer(self, text: impl Into<String>) -> Self {
        self.turn(ScriptedTurn::Fragments(vec![StreamFragment::answer(text)]))
    }

    /// Queue an arbitrary turn
    pub fn turn(self, turn: ScriptedTurn) -> Self {
        self.turns.lock().unwrap_or_else(PoisonError::into_inner).push_back(turn);
        self
    }

    /// Token cancelled by [`ScriptedTurn::Interrupt`]
    pub fn with_interrupt(mut self, token: CancellationToken) -> Self {
        self.interrupt = Some(token);
        self
    }

    /// Every `(model, history)` pair passed to `generate`, in call order
    pub fn requests(&self) -> Vec<(String, Vec<Message>)> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Turns not consumed yet
    pub fn remaining(&self) -> usize {
        self.turns.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn generate(&self, model: &str, history: &[Message]) -> Result<FragmentStream, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((model.to_string(), history.to_vec()));

        let turn = self
            .turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("mock script exhausted".to_string()))?;

        let stream: FragmentStream = match turn {
            ScriptedTurn::Fragments(fragments) => stream::iter(fragments.into_iter().map(Ok)).boxed(),
            ScriptedTurn::Failure { fragments, message } => stream::iter(fragments.into_iter().map(Ok))
                .chain(stream::once(async move { Err(LlmError::Backend(message)) }))
                .boxed(),
            ScriptedTurn::Interrupt => {
                if let Some(token) = &self.interrupt {
                    token.cancel();
                }
                stream::pending().boxed()
            }
        };
        Ok(stream)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
