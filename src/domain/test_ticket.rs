use serde::{Deserialize, Serialize};

/// One functional area inside a proposed Epic split, covering a subset of
/// the Epic's child tickets.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TicketGroup {
    pub functional_area: String,
    pub ticket_keys: Vec<String>,
    pub estimated_test_cases: u32,
    #[serde(default)]
    pub rationale: String,
}

/// One candidate way of splitting an Epic's children into functional test
/// scopes. The planner proposes several; the evaluator picks one.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SplitStrategy {
    pub name: String,
    pub groups: Vec<TicketGroup>,
}

/// Per-dimension 0-10 scores for one candidate split strategy.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct StrategyScore {
    pub testability: u8,
    pub coverage: u8,
    pub manageability: u8,
    pub independence: u8,
    pub parallelizability: u8,
}

impl StrategyScore {
    /// Weighted overall score on the same 0-10 scale. Computed here, not
    /// trusted from the model, so ranking stays deterministic.
    pub fn overall(&self) -> f64 {
        f64::from(self.testability) * 0.25
            + f64::from(self.coverage) * 0.25
            + f64::from(self.manageability) * 0.20
            + f64::from(self.independence) * 0.15
            + f64::from(self.parallelizability) * 0.15
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScoredStrategy {
    pub strategy: SplitStrategy,
    pub score: StrategyScore,
    pub overall: f64,
}

/// A draft functional test ticket for one group of the selected split.
/// Replaced wholesale on regeneration, never merged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TestTicketDraft {
    pub functional_area: String,
    pub summary: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub quality_score: u8,
}

/// Trailer every draft description must end with, listing the covered
/// child-ticket keys.
pub const SOURCE_TICKETS_TRAILER: &str = "Source Tickets:";

pub const MIN_ACCEPTANCE_CRITERIA: usize = 5;
pub const MAX_ACCEPTANCE_CRITERIA: usize = 8;

impl TestTicketDraft {
    /// The draft's trailer line, if the description carries one.
    pub fn trailer_line(&self) -> Option<&str> {
        self.description
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .filter(|line| line.trim_start().starts_with(SOURCE_TICKETS_TRAILER))
    }
}

/// Reviewer output for one draft.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TicketReview {
    pub quality_score: u8,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub summary: String,
}
