//! Self-judgment: the feedback prompt and the approval check.
//!
//! The same model that produced an answer is asked to judge it. It approves
//! by replying with nothing but the sentinel word; anything else is feedback
//! for the next attempt.
//!
//! ## Key Principles
//!
//! 1. **Binary decisions only** - the sentinel or not. No scores, no "mostly good".
//! 2. **Exact match** - `Done!` or `DONE, but...` are rejections. A judge that
//!    wants to stop must say so unambiguously.
//! 3. **Specific criteria** - simplicity, quality and uniqueness, each at a high bar.

/// Sentinel the judge replies with to approve.
pub const DEFAULT_SENTINEL: &str = "DONE";

/// Instruction appended as the third message of every feedback request.
pub const DEFAULT_FEEDBACK_PROMPT: &str = "Judge your previous answer against three criteria: simplicity, \
quality and uniqueness. Each must pass at a high bar. If all three pass, reply with exactly DONE and \
nothing else. Otherwise reply with one thing that is good about the answer, then one concrete thing \
that must change.";

/// What the judge is asked and what counts as approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeCriteria {
    /// Feedback prompt sent after the latest attempt
    pub prompt: String,
    /// Approval token, compared after trimming and upper-casing
    pub sentinel: String,
}

impl Default for JudgeCriteria {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_FEEDBACK_PROMPT.to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }
}

impl JudgeCriteria {
    pub fn new(prompt: impl Into<String>, sentinel: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            sentinel: sentinel.into().trim().to_uppercase(),
        }
    }

    /// Whether `feedback` is unconditional approval.
    pub fn is_approved(&self, feedback: &str) -> bool {
        is_approved_with(feedback, &self.sentinel)
    }
}

/// Approval check against the default `DONE` sentinel.
pub fn is_approved(feedback: &str) -> bool {
    is_approved_with(feedback, DEFAULT_SENTINEL)
}

fn is_approved_with(feedback: &str, sentinel: &str) -> bool {
    !sentinel.is_empty() && feedback.trim().to_uppercase() == sentinel
}
