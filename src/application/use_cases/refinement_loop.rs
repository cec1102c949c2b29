//! The generate -> validate -> review -> refine orchestrator.
//!
//! An explicit state machine with a bounded counter: termination is
//! structural, not a property of model behavior. Each iteration produces
//! a whole fresh attempt (requirements and test cases together); nothing
//! is ever patched across iterations. The deterministic structural gate
//! always runs before the critic, so a critic call is never spent on an
//! attempt that fails arithmetic.

use crate::application::use_cases::completion_service::CompletionService;
use crate::application::use_cases::critic_reviewer::CriticReviewer;
use crate::application::use_cases::requirement_extractor::RequirementExtractor;
use crate::application::use_cases::structural_validator::StructuralValidator;
use crate::application::use_cases::test_case_generator::TestCaseGenerator;
use crate::domain::artifact::{GenerationResult, Requirement, TestCase};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_run::LlmRunRecord;
use crate::domain::review::{CriticVerdict, ValidationIssue};
use crate::domain::ticket::TicketContext;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RefinementConfig {
    /// Upper bound on full generate/validate/review iterations. Each
    /// completion call costs real money and seconds; an unbounded loop
    /// is a correctness bug, not a feature.
    #[validate(range(min = 1, message = "max_iterations must be at least 1"))]
    pub max_iterations: u32,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self { max_iterations: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Generating,
    StructuralCheck,
    CriticReview,
    Regenerate,
    Done,
}

/// One iteration's artifacts. Superseded wholesale by the next iteration.
struct Attempt {
    requirements: Vec<Requirement>,
    test_cases: Vec<TestCase>,
    structural_issues: Vec<ValidationIssue>,
    verdict: Option<CriticVerdict>,
}

/// Everything the loop hands back. `result` alone is the canonical
/// export payload; the flags tell the caller how much to trust it.
#[derive(Debug)]
pub struct RefinementOutcome {
    pub result: GenerationResult,
    pub approved: bool,
    pub exhausted: bool,
    pub cancelled: bool,
    pub outstanding_issues: Vec<ValidationIssue>,
    pub runs: Vec<LlmRunRecord>,
}

pub struct RefinementLoop {
    extractor: RequirementExtractor,
    generator: TestCaseGenerator,
    critic: CriticReviewer,
    config: RefinementConfig,
}

impl RefinementLoop {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self::with_config(completion, RefinementConfig::default())
    }

    pub fn with_config(completion: Arc<CompletionService>, config: RefinementConfig) -> Self {
        Self {
            extractor: RequirementExtractor::new(completion.clone()),
            generator: TestCaseGenerator::new(completion.clone()),
            critic: CriticReviewer::new(completion),
            config,
        }
    }

    /// Drive the loop to a terminal state. `cancel` is polled between
    /// iterations only; a set flag returns the last fully-completed
    /// iteration, or an error when none has completed yet. Transport
    /// failures and a parse failure on the final iteration propagate -
    /// a plausible-looking placeholder artifact is never fabricated.
    pub async fn run(
        &self,
        ticket: &TicketContext,
        cancel: Option<&AtomicBool>,
    ) -> Result<RefinementOutcome> {
        self.config
            .validate()
            .map_err(|err| AppError::ValidationError(err.to_string()))?;

        let max_iterations = self.config.max_iterations;
        let mut state = LoopState::Generating;
        let mut iteration: u32 = 1;
        let mut feedback: Option<String> = None;
        let mut runs: Vec<LlmRunRecord> = Vec::new();
        let mut attempt: Option<Attempt> = None;

        loop {
            match state {
                LoopState::Generating => {
                    if cancelled(cancel) {
                        return finish_cancelled(attempt, iteration, runs);
                    }

                    debug!(iteration, max_iterations, "Starting generation attempt");
                    let extracted = self.extractor.extract(ticket).await;
                    let (requirements, extract_record) = match extracted {
                        Ok(value) => value,
                        Err(err) => {
                            recover(err, iteration, max_iterations)?;
                            state = LoopState::Regenerate;
                            continue;
                        }
                    };
                    runs.push(extract_record);

                    let generated = self
                        .generator
                        .generate(ticket, &requirements, feedback.as_deref())
                        .await;
                    let (test_cases, generate_record) = match generated {
                        Ok(value) => value,
                        Err(err) => {
                            recover(err, iteration, max_iterations)?;
                            state = LoopState::Regenerate;
                            continue;
                        }
                    };
                    runs.push(generate_record);

                    attempt = Some(Attempt {
                        requirements,
                        test_cases,
                        structural_issues: Vec::new(),
                        verdict: None,
                    });
                    state = LoopState::StructuralCheck;
                }

                LoopState::StructuralCheck => {
                    let Some(current) = attempt.as_mut() else {
                        return Err(AppError::Internal(
                            "Structural check reached without an attempt".to_string(),
                        ));
                    };
                    let issues = StructuralValidator::validate(
                        &current.requirements,
                        &current.test_cases,
                    );
                    if issues.is_empty() {
                        state = LoopState::CriticReview;
                        continue;
                    }

                    warn!(
                        iteration,
                        issue_count = issues.len(),
                        "Attempt failed structural validation"
                    );
                    feedback = Some(StructuralValidator::feedback_text(&issues));
                    current.structural_issues = issues;
                    state = if iteration < max_iterations {
                        LoopState::Regenerate
                    } else {
                        LoopState::Done
                    };
                }

                LoopState::CriticReview => {
                    let Some(current) = attempt.as_mut() else {
                        return Err(AppError::Internal(
                            "Critic review reached without an attempt".to_string(),
                        ));
                    };
                    let reviewed = self
                        .critic
                        .review(ticket, &current.requirements, &current.test_cases)
                        .await;
                    let (verdict, review_record) = match reviewed {
                        Ok(value) => value,
                        Err(err) => {
                            recover(err, iteration, max_iterations)?;
                            state = LoopState::Regenerate;
                            continue;
                        }
                    };
                    runs.push(review_record);

                    if verdict.approved {
                        info!(iteration, "Critic approved the attempt");
                        current.verdict = Some(verdict);
                        state = LoopState::Done;
                        continue;
                    }

                    debug!(
                        iteration,
                        issue_count = verdict.issues.len(),
                        "Critic rejected the attempt"
                    );
                    feedback = Some(critic_feedback_text(&verdict));
                    current.verdict = Some(verdict);
                    state = if iteration < max_iterations {
                        LoopState::Regenerate
                    } else {
                        LoopState::Done
                    };
                }

                LoopState::Regenerate => {
                    if iteration >= max_iterations {
                        state = LoopState::Done;
                        continue;
                    }
                    iteration += 1;
                    state = LoopState::Generating;
                }

                LoopState::Done => {
                    return finish(attempt, iteration, max_iterations, runs);
                }
            }
        }
    }
}

/// Policy for mid-loop errors: transport and validation failures always
/// surface; a parse failure is retried as a fresh iteration while any
/// remain, and surfaces on the last one. Returning `Ok(())` means retry.
fn recover(err: AppError, iteration: u32, max_iterations: u32) -> Result<()> {
    match err {
        AppError::ParseError(message) if iteration < max_iterations => {
            warn!(iteration, error = %message, "Attempt unparseable, regenerating");
            Ok(())
        }
        other => Err(other),
    }
}

fn cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.map(|flag| flag.load(Ordering::SeqCst)).unwrap_or(false)
}

fn finish_cancelled(
    attempt: Option<Attempt>,
    iteration: u32,
    runs: Vec<LlmRunRecord>,
) -> Result<RefinementOutcome> {
    let Some(attempt) = attempt else {
        return Err(AppError::Internal(
            "Generation cancelled before any iteration completed".to_string(),
        ));
    };
    info!("Generation cancelled, returning last completed iteration");
    let mut outcome = build_outcome(attempt, iteration.saturating_sub(1), runs)?;
    outcome.cancelled = true;
    Ok(outcome)
}

fn finish(
    attempt: Option<Attempt>,
    iteration: u32,
    max_iterations: u32,
    runs: Vec<LlmRunRecord>,
) -> Result<RefinementOutcome> {
    let attempt = attempt.ok_or_else(|| {
        AppError::Internal("Refinement loop terminated without an attempt".to_string())
    })?;
    let approved = attempt
        .verdict
        .as_ref()
        .map(|verdict| verdict.approved)
        .unwrap_or(false);
    let mut outcome = build_outcome(attempt, iteration, runs)?;
    outcome.approved = approved;
    outcome.exhausted = !approved && iteration >= max_iterations;
    if outcome.exhausted {
        warn!(
            iterations = iteration,
            "Refinement exhausted without full approval"
        );
    }
    Ok(outcome)
}

fn build_outcome(
    attempt: Attempt,
    iterations_used: u32,
    runs: Vec<LlmRunRecord>,
) -> Result<RefinementOutcome> {
    let Attempt {
        requirements,
        test_cases,
        structural_issues,
        verdict,
    } = attempt;

    let verdict = verdict.unwrap_or_else(|| {
        CriticVerdict::rejected_on_structure(structural_issues.clone(), iterations_used)
    });

    let mut outstanding_issues = structural_issues;
    if !verdict.approved {
        for issue in &verdict.issues {
            if !outstanding_issues.contains(issue) {
                outstanding_issues.push(issue.clone());
            }
        }
    }

    Ok(RefinementOutcome {
        approved: verdict.approved,
        exhausted: false,
        cancelled: false,
        result: GenerationResult {
            requirements,
            test_cases,
            critic_verdict: verdict,
            iterations_used,
        },
        outstanding_issues,
        runs,
    })
}

fn critic_feedback_text(verdict: &CriticVerdict) -> String {
    let mut text = String::new();
    for issue in &verdict.issues {
        text.push_str(&format!(
            "- {}: {} (fix: {})\n",
            issue.subject, issue.message, issue.suggestion
        ));
    }
    for scenario in &verdict.missing_scenarios {
        text.push_str(&format!("- missing scenario: {}\n", scenario));
    }
    if !verdict.recommendation.trim().is_empty() {
        text.push_str(&format!(
            "- reviewer recommendation: {}\n",
            verdict.recommendation
        ));
    }
    text
}
