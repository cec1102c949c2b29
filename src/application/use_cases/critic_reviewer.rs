//! Phase 3: LLM-judged quality review of a structurally valid attempt.
//!
//! Structural violations never reach this point; the rubric restates the
//! counting rules anyway so the model double-checks them while building
//! its traceability matrix. Only `approved` stops the loop - everything
//! else in the verdict feeds the next corrective prompt.

use crate::application::use_cases::completion_service::CompletionService;
use crate::domain::artifact::{Requirement, TestCase};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_run::LlmRunRecord;
use crate::domain::review::{CriticVerdict, OverallQuality};
use crate::domain::schema::ArtifactSchema;
use crate::domain::ticket::TicketContext;
use crate::infrastructure::response::{extract_embedded_object, extract_json_payload, preview_text};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const PROMPT_VERSION: &str = "v1";
const REVIEW_MAX_TOKENS: u32 = 4096;

pub struct CriticReviewer {
    completion: Arc<CompletionService>,
}

impl CriticReviewer {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self { completion }
    }

    pub async fn review(
        &self,
        ticket: &TicketContext,
        requirements: &[Requirement],
        test_cases: &[TestCase],
    ) -> Result<(CriticVerdict, LlmRunRecord)> {
        let system_prompt = build_system_prompt();
        let user_prompt = build_user_prompt(ticket, requirements, test_cases);

        debug!(
            requirement_count = requirements.len(),
            case_count = test_cases.len(),
            "Running critic review"
        );
        let output = self
            .completion
            .complete(
                &system_prompt,
                &user_prompt,
                REVIEW_MAX_TOKENS,
                Some(ArtifactSchema::critic_verdict()),
            )
            .await?;

        let verdict = parse_verdict(&output)?;

        let record = LlmRunRecord::new(
            "critic_review",
            ticket.summary.chars().take(60).collect::<String>(),
            self.completion.model(),
            PROMPT_VERSION,
            format!(
                "requirements={} cases={} approved={} quality={:?}",
                requirements.len(),
                test_cases.len(),
                verdict.approved,
                verdict.overall_quality
            ),
        );

        Ok((verdict, record))
    }
}

fn build_system_prompt() -> String {
    "You are a senior QA reviewer judging a generated test suite against its requirements.\n\
     Build a traceability matrix: every requirement must be covered by exactly one positive, one negative and one edge_case test case (3 per requirement overall).\n\
     Then judge the content: are steps concrete and executable, are expected results verifiable, are boundary values actually at the boundary, is anything important untested?\n\
     Flag missing fields and weak scenarios as issues; list genuinely untested behaviors in missing_scenarios.\n\
     Recommend approve only when the suite is complete and executable as written.\n\
     Return only JSON: {\"approved\", \"overall_quality\", \"confidence\", \"issues\", \"missing_scenarios\", \"summary\", \"recommendation\"}."
        .to_string()
}

fn build_user_prompt(
    ticket: &TicketContext,
    requirements: &[Requirement],
    test_cases: &[TestCase],
) -> String {
    let mut body = String::new();
    body.push_str(&format!("Ticket summary: {}\n", ticket.summary));

    body.push_str("\nRequirements:\n");
    for requirement in requirements {
        body.push_str(&format!(
            "- {}: {}\n",
            requirement.id, requirement.description
        ));
    }

    body.push_str("\nTest cases:\n");
    for case in test_cases {
        body.push_str(&format!(
            "- [{}] {} (priority {}, {} steps)\n",
            case.test_type, case.title, case.priority, case.steps.len()
        ));
        for step in &case.steps {
            body.push_str(&format!("    * {} => {}\n", step.action, step.expected));
        }
    }

    body
}

/// Strict decode first; then a permissive pass over a bare JSON object
/// where absent fields default pessimistic (not approved, confidence 0).
fn parse_verdict(output: &str) -> Result<CriticVerdict> {
    let payload = extract_json_payload(output);
    if let Ok(verdict) = serde_json::from_str::<CriticVerdict>(&payload) {
        return Ok(verdict);
    }

    let candidate = extract_embedded_object(&payload).unwrap_or_else(|| payload.clone());
    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        if value.is_object() {
            return Ok(permissive_verdict(&value));
        }
    }

    Err(AppError::ParseError(format!(
        "Failed to parse critic verdict | output_snippet={}",
        preview_text(&payload, 600)
    )))
}

fn permissive_verdict(value: &Value) -> CriticVerdict {
    #[derive(Deserialize)]
    struct LooseIssue {
        severity: Option<crate::domain::review::IssueSeverity>,
        kind: Option<crate::domain::review::IssueKind>,
        subject: Option<String>,
        message: Option<String>,
        suggestion: Option<String>,
    }

    let issues = value
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<LooseIssue>(item.clone()).ok())
                .map(|loose| crate::domain::review::ValidationIssue {
                    severity: loose
                        .severity
                        .unwrap_or(crate::domain::review::IssueSeverity::Major),
                    kind: loose
                        .kind
                        .unwrap_or(crate::domain::review::IssueKind::MissingField),
                    subject: loose.subject.unwrap_or_default(),
                    message: loose.message.unwrap_or_default(),
                    suggestion: loose.suggestion.unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    let missing_scenarios = value
        .get("missing_scenarios")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    CriticVerdict {
        approved: value.get("approved").and_then(Value::as_bool).unwrap_or(false),
        overall_quality: value
            .get("overall_quality")
            .cloned()
            .and_then(|quality| serde_json::from_value(quality).ok())
            .unwrap_or(OverallQuality::Poor),
        confidence: value
            .get("confidence")
            .and_then(Value::as_u64)
            .map(|confidence| confidence.min(100) as u8)
            .unwrap_or(0),
        issues,
        missing_scenarios,
        summary: value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        recommendation: value
            .get("recommendation")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::completion_service::CompletionConfig;
    use crate::domain::artifact::RequirementSource;
    use crate::infrastructure::llm_clients::stub::StubClient;

    fn ticket() -> TicketContext {
        TicketContext {
            summary: "Login".to_string(),
            description: String::new(),
            acceptance_criteria: vec![],
            attachments_text: String::new(),
        }
    }

    fn reviewer(client: StubClient) -> CriticReviewer {
        CriticReviewer::new(Arc::new(CompletionService::with_config(
            Arc::new(client),
            Default::default(),
            CompletionConfig {
                max_retries: 0,
                retry_delay_ms: 0,
            },
        )))
    }

    fn requirement() -> Requirement {
        Requirement {
            id: "REQ-001".to_string(),
            description: "d".to_string(),
            source: RequirementSource::Description,
        }
    }

    #[tokio::test]
    async fn test_parses_full_verdict() {
        let client = StubClient::with_fallback(
            r#"{"approved":true,"overall_quality":"good","confidence":85,
                "issues":[],"missing_scenarios":[],"summary":"ok","recommendation":"approve"}"#,
        );
        let (verdict, record) = reviewer(client)
            .review(&ticket(), &[requirement()], &[])
            .await
            .unwrap();
        assert!(verdict.approved);
        assert_eq!(verdict.confidence, 85);
        assert_eq!(record.scope, "critic_review");
    }

    #[tokio::test]
    async fn test_partial_verdict_defaults_pessimistic() {
        let client = StubClient::with_fallback(r#"{"summary":"meh"}"#);
        let (verdict, _) = reviewer(client)
            .review(&ticket(), &[requirement()], &[])
            .await
            .unwrap();
        assert!(!verdict.approved);
        assert_eq!(verdict.confidence, 0);
        assert_eq!(verdict.overall_quality, OverallQuality::Poor);
        assert_eq!(verdict.summary, "meh");
    }

    #[test]
    fn test_permissive_parse_salvages_issues() {
        let value: Value = serde_json::from_str(
            r#"{"approved":false,
                "issues":[{"severity":"major","kind":"missing_field","subject":"REQ-001",
                           "message":"no negative case","suggestion":"add one"}],
                "missing_scenarios":["timeout handling"]}"#,
        )
        .unwrap();
        let verdict = permissive_verdict(&value);
        assert_eq!(verdict.issues.len(), 1);
        assert_eq!(verdict.missing_scenarios, vec!["timeout handling"]);
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(
            parse_verdict("[1, 2, 3]"),
            Err(AppError::ParseError(_))
        ));
    }
}
