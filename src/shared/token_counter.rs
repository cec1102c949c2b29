//! Universal token counter for context window management.
//!
//! Character-based estimation (~4 characters per token) that holds up
//! well enough across OpenAI, Gemini, Anthropic and local backends
//! without provider-specific tokenizers. The orchestration core only
//! needs a conservative fit check, not exact counts.

pub struct TokenCounter;

impl TokenCounter {
    /// Estimate token count for a block of text.
    pub fn estimate_tokens(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        (text.len() + 3) / 4
    }

    /// Estimate tokens for a system + user prompt pair, including a small
    /// per-message formatting overhead.
    pub fn estimate_prompt_tokens(system: &str, user: &str) -> usize {
        let base_tokens = 2 * 4;
        base_tokens + Self::estimate_tokens(system) + Self::estimate_tokens(user)
    }

    /// Tokens left for prompt content once the response reservation is
    /// taken out of the context window.
    pub fn available_for_prompt(context_window: usize, reserved_for_response: usize) -> usize {
        context_window.saturating_sub(reserved_for_response)
    }

    pub fn fits_in_context(estimated: usize, context_window: usize) -> bool {
        estimated < context_window
    }
}
