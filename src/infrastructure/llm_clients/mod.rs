pub mod gemini;
pub mod openai;

#[cfg(test)]
pub mod stub;

use crate::domain::error::Result;
use crate::domain::llm_config::LLMConfig;
use crate::domain::llm_config::LLMProvider;
use crate::domain::schema::ArtifactSchema;
use async_trait::async_trait;
use gemini::GeminiClient;
use openai::OpenAIClient;

#[async_trait]
pub trait LLMClient {
    /// One completion round trip. When `schema` is given and the provider
    /// supports constrained decoding it is forwarded; otherwise the client
    /// falls back to plain JSON-mode and callers parse defensively.
    async fn generate(
        &self,
        config: &LLMConfig,
        system: &str,
        user: &str,
        schema: Option<&ArtifactSchema>,
    ) -> Result<String>;
}

pub struct RouterClient {
    openai: OpenAIClient,
    gemini: GeminiClient,
}

impl RouterClient {
    pub fn new() -> Self {
        Self {
            openai: OpenAIClient::new(),
            gemini: GeminiClient::new(),
        }
    }
}

impl Default for RouterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for RouterClient {
    async fn generate(
        &self,
        config: &LLMConfig,
        system: &str,
        user: &str,
        schema: Option<&ArtifactSchema>,
    ) -> Result<String> {
        match config.provider {
            LLMProvider::Google => self.gemini.generate(config, system, user, schema).await,
            _ => self.openai.generate(config, system, user, schema).await,
        }
    }
}
