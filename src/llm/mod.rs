//! Model backend layer - Ollama integration with streamed responses
//!
//! This module provides:
//! - Message types shared by the conversation and the wire format
//! - ModelBackend trait for backend abstraction
//! - OllamaClient implementation
//! - NDJSON stream decoding into reasoning/answer fragments

pub mod client;
pub mod ollama;
pub mod streaming;
pub mod types;

pub use client::{LlmError, MockBackend, ModelBackend, ScriptedTurn};
pub use ollama::{OllamaClient, OllamaConfig};
pub use streaming::{ChatChunk, FragmentKind, FragmentStream, LineBuffer, StreamFragment, decode_chat_stream};
pub use types::{Message, Role};
