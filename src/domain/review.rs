use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Critical,
    Major,
    Minor,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    FormulaViolation,
    MissingField,
    StepCount,
    DistributionMismatch,
    DanglingReference,
}

/// One concrete defect in a generation attempt. Produced either by the
/// deterministic structural checks or by the critic; consumed within the
/// same refinement iteration to build corrective feedback.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub kind: IssueKind,
    pub subject: String,
    pub message: String,
    pub suggestion: String,
}

impl ValidationIssue {
    pub fn new(
        severity: IssueSeverity,
        kind: IssueKind,
        subject: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            kind,
            subject: subject.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallQuality {
    Excellent,
    Good,
    #[serde(alias = "NeedsImprovement")]
    NeedsImprovement,
    Poor,
}

/// The critic's quality verdict over an already structurally valid
/// attempt. Only `approved` drives loop termination; the rest feeds the
/// next iteration's corrective prompt.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CriticVerdict {
    pub approved: bool,
    pub overall_quality: OverallQuality,
    pub confidence: u8,
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
    #[serde(default)]
    pub missing_scenarios: Vec<String>,
    pub summary: String,
    pub recommendation: String,
}

impl CriticVerdict {
    /// Rejected verdict built from deterministic structural issues, used
    /// when the loop exhausts its iterations without ever reaching the
    /// critic. Keeps the final result honest instead of silently empty.
    pub fn rejected_on_structure(issues: Vec<ValidationIssue>, iterations: u32) -> Self {
        Self {
            approved: false,
            overall_quality: OverallQuality::Poor,
            confidence: 100,
            issues,
            missing_scenarios: Vec::new(),
            summary: format!(
                "Structural validation failed on every one of {} iterations.",
                iterations
            ),
            recommendation: "Reject: artifacts never passed deterministic structural checks."
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&IssueKind::FormulaViolation).unwrap(),
            "\"formula_violation\""
        );
        assert_eq!(
            serde_json::to_string(&IssueKind::DanglingReference).unwrap(),
            "\"dangling_reference\""
        );
        assert_eq!(
            serde_json::to_string(&OverallQuality::NeedsImprovement).unwrap(),
            "\"needs_improvement\""
        );
    }

    #[test]
    fn test_rejected_on_structure_is_not_approved() {
        let verdict = CriticVerdict::rejected_on_structure(
            vec![ValidationIssue::new(
                IssueSeverity::Critical,
                IssueKind::FormulaViolation,
                "test_cases",
                "expected 30 test cases, found 25",
                "generate exactly 3 test cases per requirement",
            )],
            3,
        );
        assert!(!verdict.approved);
        assert_eq!(verdict.overall_quality, OverallQuality::Poor);
        assert_eq!(verdict.issues.len(), 1);
    }
}
