//! Error types for squared
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::llm::LlmError;

/// All error types that can occur in squared
#[derive(Debug, Error)]
pub enum SquaredError {
    /// The backend stream ended abnormally (network failure, backend-reported error)
    #[error("Backend stream error: {0}")]
    BackendStream(#[from] LlmError),

    /// The operator cancelled the loop
    #[error("Interrupted")]
    Interrupted,

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An external command failed to run or exited non-zero
    #[error("Command error: {0}")]
    Command(String),
}

/// Result type alias for squared operations
pub type Result<T> = std::result::Result<T, SquaredError>;
