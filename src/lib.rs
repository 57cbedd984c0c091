//! squared - a self-critiquing agent loop
//!
//! squared sends a task to a language model, asks the same model to judge the
//! answer for simplicity, quality and uniqueness, and feeds that judgment back
//! into the conversation until the judge replies with the approval sentinel.

pub mod conversation;
pub mod error;
pub mod llm;
pub mod puller;
pub mod runner;
pub mod validation;

pub use error::{Result, SquaredError};
