//! Deterministic structural checks over a generation attempt.
//!
//! No LLM involvement: counting rules are exactly what model output
//! cannot be trusted to self-report, so this gate runs first and costs
//! nothing. Same input, same issue list, every time.

use crate::domain::artifact::{
    Requirement, TestCase, TestType, CASES_PER_REQUIREMENT, MAX_PRIORITY, MAX_STEPS_PER_CASE,
    MIN_PRIORITY, MIN_STEPS_PER_CASE,
};
use crate::domain::review::{IssueKind, IssueSeverity, ValidationIssue};
use std::collections::{HashMap, HashSet};

pub struct StructuralValidator;

impl StructuralValidator {
    /// Pure function: checks run in a fixed order and iterate the input
    /// slices in their given order, so the issue list is reproducible.
    pub fn validate(requirements: &[Requirement], test_cases: &[TestCase]) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        check_formula(requirements, test_cases, &mut issues);
        check_distribution(requirements, test_cases, &mut issues);
        check_steps(test_cases, &mut issues);
        check_fields(test_cases, &mut issues);
        check_references(requirements, test_cases, &mut issues);

        issues
    }

    /// Renders issues into the corrective feedback block embedded in the
    /// next attempt's prompt.
    pub fn feedback_text(issues: &[ValidationIssue]) -> String {
        let mut text = String::new();
        for issue in issues {
            text.push_str(&format!(
                "- [{:?}] {}: {} (fix: {})\n",
                issue.kind, issue.subject, issue.message, issue.suggestion
            ));
        }
        text
    }
}

fn check_formula(
    requirements: &[Requirement],
    test_cases: &[TestCase],
    issues: &mut Vec<ValidationIssue>,
) {
    let expected = requirements.len() * CASES_PER_REQUIREMENT;
    if test_cases.len() != expected {
        issues.push(ValidationIssue::new(
            IssueSeverity::Critical,
            IssueKind::FormulaViolation,
            "test_cases",
            format!(
                "expected {} test cases ({} requirements x {}), found {}",
                expected,
                requirements.len(),
                CASES_PER_REQUIREMENT,
                test_cases.len()
            ),
            "generate exactly 3 test cases (positive, negative, edge_case) for every requirement",
        ));
    }
}

fn check_distribution(
    requirements: &[Requirement],
    test_cases: &[TestCase],
    issues: &mut Vec<ValidationIssue>,
) {
    let mut seen_ids = HashSet::new();
    for requirement in requirements {
        if !seen_ids.insert(requirement.id.as_str()) {
            issues.push(ValidationIssue::new(
                IssueSeverity::Major,
                IssueKind::DistributionMismatch,
                requirement.id.clone(),
                format!("requirement id {} appears more than once", requirement.id),
                "renumber requirements so every id is unique",
            ));
        }
    }

    let mut counts: HashMap<(&str, TestType), usize> = HashMap::new();
    for case in test_cases {
        *counts
            .entry((case.requirement_id.as_str(), case.test_type))
            .or_insert(0) += 1;
    }

    for requirement in requirements {
        for test_type in TestType::ALL {
            let count = counts
                .get(&(requirement.id.as_str(), test_type))
                .copied()
                .unwrap_or(0);
            if count != 1 {
                issues.push(ValidationIssue::new(
                    IssueSeverity::Major,
                    IssueKind::DistributionMismatch,
                    requirement.id.clone(),
                    format!(
                        "expected exactly one {} test case for {}, found {}",
                        test_type, requirement.id, count
                    ),
                    format!(
                        "provide exactly one {} test case for {}",
                        test_type, requirement.id
                    ),
                ));
            }
        }
    }
}

fn check_steps(test_cases: &[TestCase], issues: &mut Vec<ValidationIssue>) {
    for case in test_cases {
        let count = case.steps.len();
        if !(MIN_STEPS_PER_CASE..=MAX_STEPS_PER_CASE).contains(&count) {
            issues.push(ValidationIssue::new(
                IssueSeverity::Major,
                IssueKind::StepCount,
                case.title.clone(),
                format!(
                    "test case has {} steps, allowed range is {}-{}",
                    count, MIN_STEPS_PER_CASE, MAX_STEPS_PER_CASE
                ),
                "rewrite the scenario with 1 to 6 concrete steps",
            ));
        }
        for (index, step) in case.steps.iter().enumerate() {
            if step.action.trim().is_empty() || step.expected.trim().is_empty() {
                issues.push(ValidationIssue::new(
                    IssueSeverity::Major,
                    IssueKind::MissingField,
                    format!("{} step {}", case.title, index + 1),
                    "step action and expected result must both be non-empty",
                    "fill in the missing action or expected result",
                ));
            }
        }
    }
}

fn check_fields(test_cases: &[TestCase], issues: &mut Vec<ValidationIssue>) {
    for case in test_cases {
        if case.title.trim().is_empty() {
            issues.push(ValidationIssue::new(
                IssueSeverity::Major,
                IssueKind::MissingField,
                case.requirement_id.clone(),
                "test case title is empty",
                "title every test case \"{requirement_id} {Type}: {description}\"",
            ));
        } else if !case.title.starts_with(&case.expected_title_prefix()) {
            issues.push(ValidationIssue::new(
                IssueSeverity::Minor,
                IssueKind::MissingField,
                case.title.clone(),
                format!(
                    "title does not start with \"{}\"",
                    case.expected_title_prefix()
                ),
                "follow the naming convention \"{requirement_id} {Type}: {description}\"",
            ));
        }
        if case.requirement_desc.trim().is_empty() {
            issues.push(ValidationIssue::new(
                IssueSeverity::Minor,
                IssueKind::MissingField,
                case.title.clone(),
                "requirement_desc is empty",
                "copy the covered requirement's description verbatim",
            ));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&case.priority) {
            issues.push(ValidationIssue::new(
                IssueSeverity::Major,
                IssueKind::MissingField,
                case.title.clone(),
                format!("priority {} is outside 1-4", case.priority),
                "set priority to an integer from 1 (critical) to 4 (low)",
            ));
        }
    }
}

fn check_references(
    requirements: &[Requirement],
    test_cases: &[TestCase],
    issues: &mut Vec<ValidationIssue>,
) {
    let known: HashSet<&str> = requirements
        .iter()
        .map(|requirement| requirement.id.as_str())
        .collect();
    for case in test_cases {
        if !known.contains(case.requirement_id.as_str()) {
            issues.push(ValidationIssue::new(
                IssueSeverity::Critical,
                IssueKind::DanglingReference,
                case.title.clone(),
                format!(
                    "requirement_id {} does not exist in the requirement list",
                    case.requirement_id
                ),
                "reference only requirement ids from the extracted list",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::{RequirementSource, TestStep};
    use std::collections::BTreeSet;

    fn requirements(count: usize) -> Vec<Requirement> {
        (1..=count)
            .map(|index| Requirement {
                id: format!("REQ-{:03}", index),
                description: format!("Requirement number {}", index),
                source: RequirementSource::Description,
            })
            .collect()
    }

    fn case(requirement: &Requirement, test_type: TestType) -> TestCase {
        TestCase {
            requirement_id: requirement.id.clone(),
            requirement_desc: requirement.description.clone(),
            title: format!(
                "{} {}: scenario for {}",
                requirement.id,
                test_type.label(),
                requirement.id
            ),
            priority: 2,
            test_type,
            tags: BTreeSet::new(),
            steps: vec![TestStep {
                action: "Do the thing".to_string(),
                expected: "The thing happens".to_string(),
            }],
        }
    }

    fn full_batch(requirements: &[Requirement]) -> Vec<TestCase> {
        requirements
            .iter()
            .flat_map(|requirement| {
                TestType::ALL
                    .iter()
                    .map(|test_type| case(requirement, *test_type))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn test_well_formed_batch_passes() {
        let requirements = requirements(10);
        let cases = full_batch(&requirements);
        assert_eq!(cases.len(), 30);
        assert!(StructuralValidator::validate(&requirements, &cases).is_empty());
    }

    #[test]
    fn test_missing_cases_emit_formula_violation() {
        let requirements = requirements(10);
        let mut cases = full_batch(&requirements);
        cases.truncate(25);

        let issues = StructuralValidator::validate(&requirements, &cases);
        let formula: Vec<_> = issues
            .iter()
            .filter(|issue| issue.kind == IssueKind::FormulaViolation)
            .collect();
        assert_eq!(formula.len(), 1);
        assert!(formula[0].message.contains("expected 30"));
        assert!(formula[0].message.contains("found 25"));
    }

    #[test]
    fn test_zero_steps_emit_step_count_issue() {
        let requirements = requirements(1);
        let mut cases = full_batch(&requirements);
        cases[0].steps.clear();

        let issues = StructuralValidator::validate(&requirements, &cases);
        let step_issues: Vec<_> = issues
            .iter()
            .filter(|issue| issue.kind == IssueKind::StepCount)
            .collect();
        assert_eq!(step_issues.len(), 1);
        assert_eq!(step_issues[0].subject, cases[0].title);
    }

    #[test]
    fn test_seven_steps_emit_step_count_issue() {
        let requirements = requirements(1);
        let mut cases = full_batch(&requirements);
        let step = cases[0].steps[0].clone();
        cases[0].steps = vec![step; 7];

        let issues = StructuralValidator::validate(&requirements, &cases);
        assert!(issues.iter().any(|issue| issue.kind == IssueKind::StepCount));
    }

    #[test]
    fn test_unknown_requirement_id_emits_dangling_reference() {
        let requirements = requirements(10);
        let mut cases = full_batch(&requirements);
        cases[0].requirement_id = "REQ-099".to_string();

        let issues = StructuralValidator::validate(&requirements, &cases);
        assert!(issues
            .iter()
            .any(|issue| issue.kind == IssueKind::DanglingReference
                && issue.message.contains("REQ-099")));
    }

    #[test]
    fn test_missing_type_emits_distribution_mismatch() {
        let requirements = requirements(2);
        let mut cases = full_batch(&requirements);
        // Swap REQ-002's negative case for a second positive.
        let position = cases
            .iter()
            .position(|case| {
                case.requirement_id == "REQ-002" && case.test_type == TestType::Negative
            })
            .unwrap();
        cases[position].test_type = TestType::Positive;

        let issues = StructuralValidator::validate(&requirements, &cases);
        let distribution: Vec<_> = issues
            .iter()
            .filter(|issue| issue.kind == IssueKind::DistributionMismatch)
            .collect();
        // One for the doubled positive, one for the missing negative.
        assert_eq!(distribution.len(), 2);
        assert!(distribution.iter().all(|issue| issue.subject == "REQ-002"));
    }

    #[test]
    fn test_duplicate_requirement_ids_flagged() {
        let mut requirements = requirements(2);
        requirements[1].id = "REQ-001".to_string();
        let cases = full_batch(&requirements);

        let issues = StructuralValidator::validate(&requirements, &cases);
        assert!(issues
            .iter()
            .any(|issue| issue.kind == IssueKind::DistributionMismatch
                && issue.message.contains("more than once")));
    }

    #[test]
    fn test_priority_and_title_convention_checked() {
        let requirements = requirements(1);
        let mut cases = full_batch(&requirements);
        cases[0].priority = 9;
        cases[1].title = "wrong title".to_string();

        let issues = StructuralValidator::validate(&requirements, &cases);
        assert!(issues
            .iter()
            .any(|issue| issue.message.contains("priority 9 is outside 1-4")));
        assert!(issues
            .iter()
            .any(|issue| issue.message.contains("does not start with")));
    }

    #[test]
    fn test_empty_step_fields_flagged() {
        let requirements = requirements(1);
        let mut cases = full_batch(&requirements);
        cases[0].steps[0].expected = "  ".to_string();

        let issues = StructuralValidator::validate(&requirements, &cases);
        assert!(issues
            .iter()
            .any(|issue| issue.kind == IssueKind::MissingField
                && issue.subject.ends_with("step 1")));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let requirements = requirements(3);
        let mut cases = full_batch(&requirements);
        cases.pop();
        cases[0].steps.clear();

        let first = StructuralValidator::validate(&requirements, &cases);
        let second = StructuralValidator::validate(&requirements, &cases);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_feedback_text_lists_every_issue() {
        let requirements = requirements(2);
        let issues = StructuralValidator::validate(&requirements, &[]);
        let feedback = StructuralValidator::feedback_text(&issues);
        assert!(feedback.contains("expected 6 test cases"));
        assert_eq!(feedback.lines().count(), issues.len());
    }
}
