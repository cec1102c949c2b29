use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Audit record for one completion call. Carries a digest and a short
/// input summary instead of the raw prompt, so persisting these never
/// leaks ticket content into storage or logs.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmRunRecord {
    pub id: String,
    pub scope: String,
    pub scope_id: String,
    pub model: String,
    pub prompt_version: String,
    pub input_digest: String,
    pub input_summary: String,
    pub created_at: i64,
}

impl LlmRunRecord {
    pub fn new(
        scope: impl Into<String>,
        scope_id: impl Into<String>,
        model: impl Into<String>,
        prompt_version: impl Into<String>,
        input_summary: impl Into<String>,
    ) -> Self {
        let model = model.into();
        let input_summary = input_summary.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            scope: scope.into(),
            scope_id: scope_id.into(),
            prompt_version: prompt_version.into(),
            input_digest: hash_input(&input_summary, &model),
            model,
            input_summary,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

fn hash_input(summary: &str, model: &str) -> String {
    let combined = format!("{}::{}", model, summary);
    let mut hasher = DefaultHasher::new();
    combined.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
