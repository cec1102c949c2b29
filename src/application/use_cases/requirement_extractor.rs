//! Phase 1: atomic requirement extraction from ticket text.
//!
//! The minimum-count policy lives in the prompt, not in runtime checks:
//! unconstrained models under-decompose, and too few requirements starve
//! downstream coverage. A ticket with genuinely no testable content is an
//! error, never a silently empty success.

use crate::application::use_cases::completion_service::CompletionService;
use crate::domain::artifact::Requirement;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_run::LlmRunRecord;
use crate::domain::schema::ArtifactSchema;
use crate::domain::ticket::TicketContext;
use crate::infrastructure::response::{extract_embedded_object, extract_json_payload, preview_text};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

const PROMPT_VERSION: &str = "v1";
const EXTRACTION_MAX_TOKENS: u32 = 4096;

const FORM_KEYWORDS: &[&str] = &[
    "field", "input", "form", "dropdown", "checkbox", "button", "radio", "upload",
];

pub struct RequirementExtractor {
    completion: Arc<CompletionService>,
}

impl RequirementExtractor {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self { completion }
    }

    pub async fn extract(
        &self,
        ticket: &TicketContext,
    ) -> Result<(Vec<Requirement>, LlmRunRecord)> {
        ticket
            .validate()
            .map_err(|err| AppError::ValidationError(err.to_string()))?;

        let minimum = minimum_requirement_count(ticket);
        let system_prompt = build_system_prompt(minimum, ticket.has_acceptance_criteria());
        let user_prompt = build_user_prompt(ticket);

        debug!(minimum, "Extracting requirements");
        let output = self
            .completion
            .complete(
                &system_prompt,
                &user_prompt,
                EXTRACTION_MAX_TOKENS,
                Some(ArtifactSchema::requirements()),
            )
            .await?;

        let requirements = parse_requirements(&output)?;
        if requirements.is_empty() {
            return Err(AppError::ValidationError(
                "No testable content found in the ticket: nothing describes a validation rule, expected behavior, or UI element".to_string(),
            ));
        }

        let record = LlmRunRecord::new(
            "requirements",
            truncate(&ticket.summary, 60),
            self.completion.model(),
            PROMPT_VERSION,
            format!(
                "summary={} ac_blocks={} attachment_chars={} min_required={} extracted={}",
                truncate(&ticket.summary, 80),
                ticket.acceptance_criteria.len(),
                ticket.attachments_text.len(),
                minimum,
                requirements.len()
            ),
        );

        Ok((requirements, record))
    }
}

/// Crude complexity heuristic: multi-field forms and AC-heavy tickets get
/// the higher floor.
fn minimum_requirement_count(ticket: &TicketContext) -> usize {
    let text = format!("{} {}", ticket.summary, ticket.description).to_lowercase();
    let keyword_hits = FORM_KEYWORDS
        .iter()
        .filter(|keyword| text.contains(*keyword))
        .count();
    if ticket.acceptance_criteria.len() >= 5 || keyword_hits >= 3 {
        12
    } else {
        8
    }
}

fn build_system_prompt(minimum: usize, has_acceptance_criteria: bool) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a QA analyst decomposing a Jira ticket into atomic, individually testable requirements. \
         One requirement per field, validation rule, button behavior, UI element, or business rule - never bundle several behaviors into one. \
         Number them REQ-001, REQ-002, ... in order. \
         For each requirement set \"source\" to one of: acceptance_criteria, description, user_story.\n",
    );
    prompt.push_str(&format!(
        "Extract at least {} requirements; split compound statements until you reach that floor.\n",
        minimum
    ));
    if !has_acceptance_criteria {
        prompt.push_str(
            "This ticket has no explicit acceptance criteria. Mine implicit testable behavior from the description: any statement describing a validation rule, expected behavior, or UI element counts. \
             If the text truly contains no testable behavior, return an empty list rather than inventing requirements.\n",
        );
    }
    prompt.push_str("Return only JSON: {\"requirements\": [{\"id\", \"description\", \"source\"}]}.");
    prompt
}

fn build_user_prompt(ticket: &TicketContext) -> String {
    let mut body = String::new();
    body.push_str(&format!("Ticket summary: {}\n", ticket.summary));
    if !ticket.description.trim().is_empty() {
        body.push_str(&format!("\nDescription:\n{}\n", ticket.description));
    }
    if ticket.has_acceptance_criteria() {
        body.push_str("\nAcceptance criteria:\n");
        for (index, block) in ticket.acceptance_criteria.iter().enumerate() {
            if block.trim().is_empty() {
                continue;
            }
            body.push_str(&format!("{}. {}\n", index + 1, block.trim()));
        }
    }
    if !ticket.attachments_text.trim().is_empty() {
        body.push_str(&format!(
            "\nAttachment content (already flattened to text):\n{}\n",
            ticket.attachments_text
        ));
    }
    body
}

#[derive(Debug, Deserialize)]
struct ExtractorOutput {
    #[serde(default)]
    requirements: Vec<Requirement>,
}

fn parse_requirements(output: &str) -> Result<Vec<Requirement>> {
    let payload = extract_json_payload(output);
    if let Ok(parsed) = serde_json::from_str::<ExtractorOutput>(&payload) {
        return Ok(parsed.requirements);
    }
    if let Ok(parsed) = serde_json::from_str::<Vec<Requirement>>(&payload) {
        return Ok(parsed);
    }
    if let Some(embedded) = extract_embedded_object(&payload) {
        if let Ok(parsed) = serde_json::from_str::<ExtractorOutput>(&embedded) {
            return Ok(parsed.requirements);
        }
    }
    Err(AppError::ParseError(format!(
        "Failed to parse requirement list | output_snippet={}",
        preview_text(&payload, 600)
    )))
}

fn truncate(value: &str, limit: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= limit {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(limit).collect();
        format!("{}...", cut)
    }
}
