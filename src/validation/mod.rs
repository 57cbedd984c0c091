// Self-judgment of loop outputs - feedback prompt and approval check

pub mod judge;

pub use judge::{DEFAULT_FEEDBACK_PROMPT, DEFAULT_SENTINEL, JudgeCriteria, is_approved};
