//! Feedback fed into the next attempt after a rejection.

use crate::task::Attempt;

/// Evaluator text beyond this many characters is cut off.
pub const MAX_CRITIQUE_CHARS: usize = 2000;

const NO_EXPLANATION: &str = "The evaluator rejected it without giving a reason.";

/// Summarize why `attempt` was rejected.
///
/// Pure and deterministic: the same attempt always yields the same string.
/// Only meaningful for attempts whose verdict is `false`.
pub fn build_critique(attempt: &Attempt) -> String {
    let reason = attempt.evaluation_raw.trim();
    let reason = if reason.is_empty() {
        NO_EXPLANATION.to_string()
    } else {
        truncate_chars(reason, MAX_CRITIQUE_CHARS)
    };

    format!(
        "--- Feedback on previous attempt #{ordinal} ---\n\
         Your previous attempt was judged inadequate by the evaluator. Its assessment:\n\
         {reason}\n\
         Revise your answer so it fully satisfies the original request above.\n\
         --- End of feedback ---",
        ordinal = attempt.ordinal,
        reason = reason,
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
