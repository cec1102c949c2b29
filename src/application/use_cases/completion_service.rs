//! Single entry point for every LLM round trip in the generation
//! pipeline: prompt-fit gate, bounded retry with linear backoff, refusal
//! detection, and JSON-mode sanity checking when a schema was requested.

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::schema::ArtifactSchema;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::{clean_llm_response, extract_json_payload, preview_text};
use crate::shared::token_counter::TokenCounter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const REFUSAL_OPENERS: &[&str] = &["i can't", "i cannot", "i'm sorry", "i am sorry", "i won't"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Extra attempts after the first call fails (transport or bad JSON).
    pub max_retries: u32,
    /// Base delay between attempts; attempt N waits N times this.
    pub retry_delay_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 500,
        }
    }
}

pub struct CompletionService {
    client: Arc<dyn LLMClient + Send + Sync>,
    llm_config: LLMConfig,
    config: CompletionConfig,
}

impl CompletionService {
    pub fn new(client: Arc<dyn LLMClient + Send + Sync>, llm_config: LLMConfig) -> Self {
        Self::with_config(client, llm_config, CompletionConfig::default())
    }

    pub fn with_config(
        client: Arc<dyn LLMClient + Send + Sync>,
        llm_config: LLMConfig,
        config: CompletionConfig,
    ) -> Self {
        Self {
            client,
            llm_config,
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.llm_config.model
    }

    /// One completion with up to `max_retries` extra attempts. The
    /// response reservation comes out of the context window before the
    /// prompt is even sent; a prompt that cannot fit fails fast with no
    /// network call. On any error the caller gets no text at all.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        schema: Option<&ArtifactSchema>,
    ) -> Result<String> {
        let estimated = TokenCounter::estimate_prompt_tokens(system, user);
        let available =
            TokenCounter::available_for_prompt(self.llm_config.context_window, max_tokens as usize);
        if !TokenCounter::fits_in_context(estimated, available) {
            return Err(AppError::ValidationError(format!(
                "Prompt (~{} tokens) does not fit the context window ({} tokens, {} reserved for the response)",
                estimated, self.llm_config.context_window, max_tokens
            )));
        }

        let call_config = self.llm_config.with_max_tokens(max_tokens);
        let mut last_error: Option<AppError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_delay_ms * u64::from(attempt);
                debug!(attempt, delay_ms = delay, "Retrying completion call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            match self
                .client
                .generate(&call_config, system, user, schema)
                .await
            {
                Ok(raw) => {
                    let cleaned = clean_llm_response(&raw);
                    if cleaned.is_empty() {
                        last_error = Some(AppError::LLMError(
                            "Backend returned an empty response".to_string(),
                        ));
                        continue;
                    }
                    if looks_like_refusal(&cleaned) {
                        return Err(AppError::LLMError(format!(
                            "Model refused the request: {}",
                            preview_text(&cleaned, 200)
                        )));
                    }
                    if schema.is_some() {
                        let payload = extract_json_payload(&cleaned);
                        if serde_json::from_str::<serde_json::Value>(&payload).is_err() {
                            warn!(attempt, "Completion was not valid JSON, retrying");
                            last_error = Some(AppError::ParseError(format!(
                                "Response is not valid JSON: {}",
                                preview_text(&payload, 200)
                            )));
                            continue;
                        }
                    }
                    return Ok(cleaned);
                }
                Err(AppError::LLMError(message)) if !message.starts_with("Model refused") => {
                    warn!(attempt, error = %message, "Completion call failed");
                    last_error = Some(AppError::LLMError(message));
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::Internal("Completion retry loop exited empty".to_string())))
    }
}

/// A conversational apology where JSON was demanded is the safety system
/// declining, not malformed output; retrying it is pointless.
fn looks_like_refusal(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    !text.contains('{') && REFUSAL_OPENERS.iter().any(|opener| lowered.starts_with(opener))
}
