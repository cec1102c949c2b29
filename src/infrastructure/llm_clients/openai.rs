use super::LLMClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::schema::ArtifactSchema;
use async_trait::async_trait;
use serde_json::json;

/// Client for OpenAI-compatible chat-completions endpoints. Also serves
/// local and Anthropic-routed backends exposed through the same API shape.
pub struct OpenAIClient {
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn completions_url(config: &LLMConfig) -> String {
        if config.base_url.ends_with('/') {
            format!("{}chat/completions", config.base_url)
        } else {
            format!("{}/chat/completions", config.base_url)
        }
    }

    fn response_format(config: &LLMConfig, schema: Option<&ArtifactSchema>) -> serde_json::Value {
        match schema {
            Some(schema) if config.provider.supports_schema() => json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                }
            }),
            _ => json!({ "type": "json_object" }),
        }
    }
}

impl Default for OpenAIClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(
        &self,
        config: &LLMConfig,
        system: &str,
        user: &str,
        schema: Option<&ArtifactSchema>,
    ) -> Result<String> {
        if config.api_key.is_none()
            && !matches!(config.provider, crate::domain::llm_config::LLMProvider::Local)
        {
            return Err(AppError::LLMError(
                "Missing API key for remote provider".to_string(),
            ));
        }

        let url = Self::completions_url(config);

        let body = json!({
            "model": config.model,
            "messages": [
                {
                    "role": "system",
                    "content": system
                },
                {
                    "role": "user",
                    "content": user
                }
            ],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "response_format": Self::response_format(config, schema),
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = config.api_key.as_ref() {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::LLMError(format!(
                "API error ({}): {}",
                status, text
            )));
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to parse JSON: {}", e)))?;

        if let Some(refusal) = parsed["choices"][0]["message"]["refusal"].as_str() {
            if !refusal.is_empty() {
                return Err(AppError::LLMError(format!(
                    "Model refused the request: {}",
                    refusal
                )));
            }
        }

        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::LLMError("Invalid response format".to_string()))
    }
}
