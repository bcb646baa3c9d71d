//! Context budget guard: token estimates checked against a model's context window.
//!
//! The estimate is a character-ratio heuristic, not a tokenizer. It only has to
//! be stable and monotonic in text length. The ratio (3.5 chars per token)
//! over-estimates for code and non-English text, which keeps prompts on the
//! safe side of the window.

use serde::Serialize;

/// Characters per token expressed as a fraction (7 / 2 == 3.5) so the estimate
/// stays in integer arithmetic.
const CHARS_PER_TOKEN_NUM: usize = 7;
const CHARS_PER_TOKEN_DEN: usize = 2;

const TRUNCATION_MARKER: &str = "\n\n[... truncated ...]";

/// Verdict of [`check_limit`] for one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetCheck {
    pub ok: bool,
    pub prompt_tokens: usize,
    pub max_context_tokens: usize,
    pub max_output_tokens: usize,
    /// Output tokens that can actually be requested for this prompt.
    pub effective_max_output: usize,
    pub warning: Option<String>,
}

/// Estimate the token count of `text` as `floor(chars / 3.5)`.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count() * CHARS_PER_TOKEN_DEN / CHARS_PER_TOKEN_NUM
}

/// Check a prompt against the context window and clamp the output budget.
pub fn check_limit(prompt: &str, max_context_tokens: usize, max_output_tokens: usize) -> BudgetCheck {
    let prompt_tokens = estimate_tokens(prompt);
    let mut check = BudgetCheck {
        ok: true,
        prompt_tokens,
        max_context_tokens,
        max_output_tokens,
        effective_max_output: max_output_tokens,
        warning: None,
    };

    let available = max_context_tokens.saturating_sub(prompt_tokens);
    if available == 0 {
        check.ok = false;
        check.effective_max_output = 0;
        check.warning = Some(format!(
            "Context overflow: prompt ({prompt_tokens}) >= max_context ({max_context_tokens})"
        ));
    } else if available < max_output_tokens {
        check.effective_max_output = available;
        check.warning = Some(format!(
            "Reduced output: {available} tokens available (requested {max_output_tokens})"
        ));
    }
    check
}

/// Cut `text` down to roughly `max_tokens`, keeping the head.
///
/// Text already within the limit is returned unchanged.
pub fn truncate_to_token_limit(text: &str, max_tokens: usize) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }
    let target_chars = max_tokens * CHARS_PER_TOKEN_NUM / CHARS_PER_TOKEN_DEN;
    let mut truncated: String = text.chars().take(target_chars).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(tokens: usize) -> String {
        // Smallest char count whose estimate equals `tokens`.
        let chars = (tokens * CHARS_PER_TOKEN_NUM).div_ceil(CHARS_PER_TOKEN_DEN);
        "x".repeat(chars)
    }

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn estimate_floors_the_ratio() {
        assert_eq!(estimate_tokens("abc"), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"a".repeat(350)), 100);
        assert_eq!(estimate_tokens(&"a".repeat(349)), 99);
    }

    #[test]
    fn estimate_counts_chars_not_bytes() {
        let ascii = "a".repeat(7);
        let accented = "ş".repeat(7);
        assert_eq!(estimate_tokens(&ascii), estimate_tokens(&accented));
    }

    #[test]
    fn estimate_is_monotonic_in_length() {
        let mut previous = 0;
        for len in 0..200 {
            let tokens = estimate_tokens(&"y".repeat(len));
            assert!(tokens >= previous, "estimate dropped at len {len}");
            previous = tokens;
        }
    }

    #[test]
    fn prompt_filling_the_window_is_rejected() {
        let prompt = text_of(100);
        assert_eq!(estimate_tokens(&prompt), 100);

        let check = check_limit(&prompt, 100, 50);
        assert!(!check.ok);
        assert_eq!(check.effective_max_output, 0);
        let warning = check.warning.expect("overflow warning");
        assert!(warning.contains("100"), "{warning}");
        assert!(warning.contains("Context overflow"), "{warning}");
    }

    #[test]
    fn prompt_near_the_window_reduces_output() {
        let prompt = text_of(99);
        assert_eq!(estimate_tokens(&prompt), 99);

        let check = check_limit(&prompt, 100, 50);
        assert!(check.ok);
        assert_eq!(check.effective_max_output, 1);
        assert!(check.warning.is_some());
    }

    #[test]
    fn small_prompt_keeps_requested_output() {
        let prompt = text_of(10);
        let check = check_limit(&prompt, 100, 50);
        assert!(check.ok);
        assert_eq!(check.prompt_tokens, 10);
        assert_eq!(check.effective_max_output, 50);
        assert_eq!(check.warning, None);
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_to_token_limit("short", 10), "short");
    }

    #[test]
    fn truncate_keeps_head_and_marks_cut() {
        let text = "a".repeat(100);
        let truncated = truncate_to_token_limit(&text, 10);
        assert!(truncated.starts_with(&"a".repeat(35)));
        assert!(!truncated.starts_with(&"a".repeat(36)));
        assert!(truncated.ends_with("[... truncated ...]"));
    }
}
