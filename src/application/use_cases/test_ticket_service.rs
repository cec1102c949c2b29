//! Drafting and reviewing one functional test ticket per group of the
//! selected Epic split.
//!
//! Same shape as the ticket-level loop one granularity up: generate,
//! gate deterministically, review, regenerate with feedback, bounded
//! attempts. A regenerated draft only replaces the previous one when its
//! score is strictly higher, and a below-threshold final draft is kept
//! and flagged, never discarded.

use crate::application::use_cases::completion_service::CompletionService;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_run::LlmRunRecord;
use crate::domain::schema::ArtifactSchema;
use crate::domain::test_ticket::{
    SplitStrategy, TestTicketDraft, TicketGroup, TicketReview, MAX_ACCEPTANCE_CRITERIA,
    MIN_ACCEPTANCE_CRITERIA, SOURCE_TICKETS_TRAILER,
};
use crate::domain::ticket::EpicContext;
use crate::infrastructure::response::{extract_embedded_object, extract_json_payload, preview_text};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

const PROMPT_VERSION: &str = "v1";
const DRAFT_MAX_TOKENS: u32 = 4096;
const REVIEW_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TicketLoopConfig {
    #[validate(range(min = 1, message = "max_attempts must be at least 1"))]
    pub max_attempts: u32,
    #[validate(range(max = 100, message = "approval_threshold is a 0-100 score"))]
    pub approval_threshold: u8,
}

impl Default for TicketLoopConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            approval_threshold: 80,
        }
    }
}

pub struct TestTicketGenerator {
    completion: Arc<CompletionService>,
}

impl TestTicketGenerator {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self { completion }
    }

    pub async fn draft(
        &self,
        epic: &EpicContext,
        group: &TicketGroup,
        feedback: Option<&str>,
    ) -> Result<(TestTicketDraft, LlmRunRecord)> {
        let system_prompt = build_draft_system_prompt();
        let user_prompt = build_draft_user_prompt(epic, group, feedback);

        let output = self
            .completion
            .complete(
                &system_prompt,
                &user_prompt,
                DRAFT_MAX_TOKENS,
                Some(ArtifactSchema::test_ticket()),
            )
            .await?;

        let mut draft = parse_draft(&output)?;
        // The group, not the model, owns the area name.
        draft.functional_area = group.functional_area.clone();

        let record = LlmRunRecord::new(
            "test_ticket",
            format!("{}/{}", epic.key, group.functional_area),
            self.completion.model(),
            PROMPT_VERSION,
            format!(
                "epic={} area={} tickets={} ac_items={} feedback={}",
                epic.key,
                group.functional_area,
                group.ticket_keys.len(),
                draft.acceptance_criteria.len(),
                feedback.is_some()
            ),
        );

        Ok((draft, record))
    }
}

pub struct TestTicketReviewer {
    completion: Arc<CompletionService>,
}

impl TestTicketReviewer {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self { completion }
    }

    pub async fn review(
        &self,
        epic: &EpicContext,
        group: &TicketGroup,
        draft: &TestTicketDraft,
    ) -> Result<(TicketReview, LlmRunRecord)> {
        let system_prompt = build_review_system_prompt();
        let user_prompt = build_review_user_prompt(epic, group, draft);

        let output = self
            .completion
            .complete(
                &system_prompt,
                &user_prompt,
                REVIEW_MAX_TOKENS,
                Some(ArtifactSchema::ticket_review()),
            )
            .await?;

        let review = parse_review(&output)?;

        let record = LlmRunRecord::new(
            "ticket_review",
            format!("{}/{}", epic.key, group.functional_area),
            self.completion.model(),
            PROMPT_VERSION,
            format!(
                "epic={} area={} score={}",
                epic.key, group.functional_area, review.quality_score
            ),
        );

        Ok((review, record))
    }
}

/// The kept draft for one group, with the review that scored it.
#[derive(Debug)]
pub struct TestTicketOutcome {
    pub draft: TestTicketDraft,
    pub review: TicketReview,
    pub approved: bool,
    pub attempts_used: u32,
    pub runs: Vec<LlmRunRecord>,
}

pub struct TestTicketService {
    generator: TestTicketGenerator,
    reviewer: TestTicketReviewer,
    config: TicketLoopConfig,
}

impl TestTicketService {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self::with_config(completion, TicketLoopConfig::default())
    }

    pub fn with_config(completion: Arc<CompletionService>, config: TicketLoopConfig) -> Self {
        Self {
            generator: TestTicketGenerator::new(completion.clone()),
            reviewer: TestTicketReviewer::new(completion),
            config,
        }
    }

    /// One draft per group of the selected strategy, sequentially: each
    /// group's loop is its own bounded conversation with the backend.
    pub async fn generate_all(
        &self,
        epic: &EpicContext,
        strategy: &SplitStrategy,
    ) -> Result<Vec<TestTicketOutcome>> {
        let mut outcomes = Vec::with_capacity(strategy.groups.len());
        for group in &strategy.groups {
            outcomes.push(self.generate_ticket(epic, group).await?);
        }
        Ok(outcomes)
    }

    pub async fn generate_ticket(
        &self,
        epic: &EpicContext,
        group: &TicketGroup,
    ) -> Result<TestTicketOutcome> {
        self.config
            .validate()
            .map_err(|err| AppError::ValidationError(err.to_string()))?;

        let max_attempts = self.config.max_attempts;
        let threshold = self.config.approval_threshold;

        let mut best: Option<(TestTicketDraft, TicketReview)> = None;
        let mut feedback: Option<String> = None;
        let mut runs: Vec<LlmRunRecord> = Vec::new();
        let mut attempts_used = 0;

        for attempt in 1..=max_attempts {
            attempts_used = attempt;

            let drafted = self.generator.draft(epic, group, feedback.as_deref()).await;
            let (mut draft, draft_record) = match drafted {
                Ok(value) => value,
                Err(AppError::ParseError(message)) if attempt < max_attempts => {
                    warn!(attempt, error = %message, "Draft unparseable, regenerating");
                    continue;
                }
                Err(err) => return Err(err),
            };
            runs.push(draft_record);

            // Cheap deterministic gate first: a draft that fails it is
            // scored zero without spending a reviewer call.
            let gate_issues = structural_gate(&draft, group);
            let review = if gate_issues.is_empty() {
                let (review, review_record) =
                    self.reviewer.review(epic, group, &draft).await?;
                runs.push(review_record);
                review
            } else {
                warn!(
                    attempt,
                    area = %group.functional_area,
                    issue_count = gate_issues.len(),
                    "Draft failed deterministic checks"
                );
                TicketReview {
                    quality_score: 0,
                    issues: gate_issues,
                    summary: "Rejected by deterministic draft checks".to_string(),
                }
            };

            draft.quality_score = review.quality_score;
            debug!(
                attempt,
                area = %group.functional_area,
                score = review.quality_score,
                "Draft reviewed"
            );

            let improves = best
                .as_ref()
                .map(|(kept, _)| review.quality_score > kept.quality_score)
                .unwrap_or(true);
            if improves {
                best = Some((draft, review.clone()));
            } else {
                debug!(
                    attempt,
                    score = review.quality_score,
                    "Regenerated draft did not improve, keeping previous"
                );
            }

            if review.quality_score >= threshold {
                break;
            }
            feedback = Some(feedback_from_review(&review));
        }

        let (draft, review) = best.ok_or_else(|| {
            AppError::Internal("Ticket loop produced no reviewable draft".to_string())
        })?;
        let approved = review.quality_score >= threshold;
        if !approved {
            info!(
                area = %group.functional_area,
                score = review.quality_score,
                threshold,
                "Keeping best below-threshold draft"
            );
        }

        Ok(TestTicketOutcome {
            draft,
            review,
            approved,
            attempts_used,
            runs,
        })
    }
}

/// Deterministic draft checks: the source-ticket trailer listing every
/// covered key, and the acceptance criteria count.
fn structural_gate(draft: &TestTicketDraft, group: &TicketGroup) -> Vec<String> {
    let mut issues = Vec::new();

    if draft.summary.trim().is_empty() {
        issues.push("summary is empty".to_string());
    }

    match draft.trailer_line() {
        None => issues.push(format!(
            "description must end with a \"{}\" line listing the covered ticket keys",
            SOURCE_TICKETS_TRAILER
        )),
        Some(trailer) => {
            for key in &group.ticket_keys {
                if !trailer.contains(key.as_str()) {
                    issues.push(format!("source-ticket trailer is missing {}", key));
                }
            }
        }
    }

    let ac_count = draft.acceptance_criteria.len();
    if !(MIN_ACCEPTANCE_CRITERIA..=MAX_ACCEPTANCE_CRITERIA).contains(&ac_count) {
        issues.push(format!(
            "expected {}-{} acceptance criteria, found {}",
            MIN_ACCEPTANCE_CRITERIA, MAX_ACCEPTANCE_CRITERIA, ac_count
        ));
    }

    issues
}

fn feedback_from_review(review: &TicketReview) -> String {
    let mut text = String::new();
    for issue in &review.issues {
        text.push_str(&format!("- {}\n", issue));
    }
    if !review.summary.trim().is_empty() {
        text.push_str(&format!("- reviewer summary: {}\n", review.summary));
    }
    text
}

fn build_draft_system_prompt() -> String {
    format!(
        "You are a QA lead writing one functional test ticket covering a group of Jira tickets.\n\
         The ticket must contain:\n\
         - summary: \"Functional tests: {{area}}\" style, one line.\n\
         - description: what to test and why, written for a tester who has not read the source tickets. \
           The last line must be \"{} <comma-separated source ticket keys>\".\n\
         - acceptance_criteria: {} to {} items, each black-box and user-facing (no implementation details).\n\
         Return only JSON: {{\"functional_area\", \"summary\", \"description\", \"acceptance_criteria\"}}.",
        SOURCE_TICKETS_TRAILER, MIN_ACCEPTANCE_CRITERIA, MAX_ACCEPTANCE_CRITERIA
    )
}

fn build_draft_user_prompt(
    epic: &EpicContext,
    group: &TicketGroup,
    feedback: Option<&str>,
) -> String {
    let mut body = String::new();
    body.push_str(&format!("Epic {}: {}\n", epic.key, epic.summary));
    body.push_str(&format!(
        "\nFunctional area: {} (~{} test cases)\nRationale: {}\n",
        group.functional_area, group.estimated_test_cases, group.rationale
    ));
    body.push_str("\nSource tickets to cover:\n");
    for child in &epic.child_tickets {
        if group.ticket_keys.contains(&child.key) {
            body.push_str(&format!("- {}: {}\n", child.key, child.summary));
            if !child.description.trim().is_empty() {
                body.push_str(&format!("  {}\n", child.description));
            }
        }
    }
    if let Some(feedback) = feedback {
        body.push_str("\nThe previous draft was rejected. Fix every one of these defects:\n");
        body.push_str(feedback);
    }
    body
}

fn build_review_system_prompt() -> String {
    "You are reviewing a functional test ticket before it is created in Jira.\n\
     Score it 0-100: does the description let a tester work without reading the source tickets, \
     are the acceptance criteria black-box and verifiable, is the scope coherent with the listed source tickets?\n\
     List every concrete defect in issues.\n\
     Return only JSON: {\"quality_score\", \"issues\", \"summary\"}."
        .to_string()
}

fn build_review_user_prompt(
    epic: &EpicContext,
    group: &TicketGroup,
    draft: &TestTicketDraft,
) -> String {
    let mut body = String::new();
    body.push_str(&format!("Epic {}: {}\n", epic.key, epic.summary));
    body.push_str(&format!(
        "\nGroup: {} covering [{}]\n",
        group.functional_area,
        group.ticket_keys.join(", ")
    ));
    body.push_str(&format!("\nDraft summary: {}\n", draft.summary));
    body.push_str(&format!("\nDraft description:\n{}\n", draft.description));
    body.push_str("\nAcceptance criteria:\n");
    for (index, criterion) in draft.acceptance_criteria.iter().enumerate() {
        body.push_str(&format!("{}. {}\n", index + 1, criterion));
    }
    body
}

fn parse_draft(output: &str) -> Result<TestTicketDraft> {
    let payload = extract_json_payload(output);
    if let Ok(draft) = serde_json::from_str::<TestTicketDraft>(&payload) {
        return Ok(draft);
    }
    if let Some(embedded) = extract_embedded_object(&payload) {
        if let Ok(draft) = serde_json::from_str::<TestTicketDraft>(&embedded) {
            return Ok(draft);
        }
    }
    Err(AppError::ParseError(format!(
        "Failed to parse test ticket draft | output_snippet={}",
        preview_text(&payload, 600)
    )))
}

fn parse_review(output: &str) -> Result<TicketReview> {
    let payload = extract_json_payload(output);
    if let Ok(review) = serde_json::from_str::<TicketReview>(&payload) {
        return Ok(review);
    }

    let candidate = extract_embedded_object(&payload).unwrap_or_else(|| payload.clone());
    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        if let Some(score) = value.get("quality_score").and_then(Value::as_u64) {
            return Ok(TicketReview {
                quality_score: score.min(100) as u8,
                issues: value
                    .get("issues")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                summary: value
                    .get("summary")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            });
        }
    }

    Err(AppError::ParseError(format!(
        "Failed to parse ticket review | output_snippet={}",
        preview_text(&payload, 600)
    )))
}
