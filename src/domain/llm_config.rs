use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LLMProvider {
    Local,
    OpenAI,
    Anthropic,
    Google,
}

impl LLMProvider {
    /// Whether the backend accepts a JSON schema for constrained decoding.
    /// Backends without it fall back to JSON-mode plus defensive parsing.
    pub fn supports_schema(&self) -> bool {
        match self {
            LLMProvider::OpenAI | LLMProvider::Google => true,
            LLMProvider::Local | LLMProvider::Anthropic => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Model context window in tokens, used to reject prompts that cannot
    /// fit before any network call is made.
    pub context_window: usize,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Local,
            base_url: "http://localhost:1234/v1".to_string(),
            model: "local-model".to_string(),
            api_key: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
            context_window: 32_768,
        }
    }
}

impl LLMConfig {
    /// Per-call copy with the token budget the phase asked for.
    pub fn with_max_tokens(&self, max_tokens: u32) -> Self {
        let mut config = self.clone();
        config.max_tokens = Some(max_tokens);
        config
    }
}
