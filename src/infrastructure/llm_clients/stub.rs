//! Queue-backed `LLMClient` double for orchestration tests. Scripted
//! responses pop in order; when the queue runs dry the fallback repeats,
//! which is how "always returns X" scenarios are expressed.

use super::LLMClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::schema::ArtifactSchema;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum StubResponse {
    Text(String),
    Transport(String),
}

pub struct StubClient {
    responses: Mutex<VecDeque<StubResponse>>,
    fallback: Option<StubResponse>,
    calls: Mutex<Vec<(String, String)>>,
}

impl StubClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(text: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(StubResponse::Text(text.into())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(StubResponse::Transport(message.into())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(StubResponse::Text(text.into()));
    }

    pub fn push_transport_error(&self, message: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(StubResponse::Transport(message.into()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn user_prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, user)| user.clone())
            .collect()
    }
}

#[async_trait]
impl LLMClient for StubClient {
    async fn generate(
        &self,
        _config: &LLMConfig,
        system: &str,
        user: &str,
        _schema: Option<&ArtifactSchema>,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));

        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone());

        match next {
            Some(StubResponse::Text(text)) => Ok(text),
            Some(StubResponse::Transport(message)) => Err(AppError::LLMError(message)),
            None => Err(AppError::LLMError("stub has no scripted response".to_string())),
        }
    }
}
