use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::review::CriticVerdict;

/// Where a requirement was mined from in the source ticket.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequirementSource {
    #[serde(alias = "AcceptanceCriteria")]
    AcceptanceCriteria,
    #[serde(alias = "Description")]
    Description,
    #[serde(alias = "UserStory")]
    UserStory,
}

/// An atomic, testable statement extracted from a ticket. Immutable within
/// a generation attempt; a rejected attempt discards the whole set.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub id: String,
    pub description: String,
    pub source: RequirementSource,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    #[serde(alias = "Positive")]
    Positive,
    #[serde(alias = "Negative")]
    Negative,
    #[serde(alias = "EdgeCase", alias = "edge")]
    EdgeCase,
}

impl TestType {
    pub const ALL: [TestType; 3] = [TestType::Positive, TestType::Negative, TestType::EdgeCase];

    /// Label used in the test case naming convention
    /// `"{requirement_id} {Type}: {description}"`.
    pub fn label(&self) -> &'static str {
        match self {
            TestType::Positive => "Positive",
            TestType::Negative => "Negative",
            TestType::EdgeCase => "EdgeCase",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TestStep {
    pub action: String,
    pub expected: String,
}

/// One Positive/Negative/EdgeCase scenario verifying one requirement.
/// Created in bulk per attempt; the whole batch is replaced on refinement,
/// never patched.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub requirement_id: String,
    pub requirement_desc: String,
    pub title: String,
    pub priority: u8,
    pub test_type: TestType,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub steps: Vec<TestStep>,
}

impl TestCase {
    /// The title prefix mandated by the naming convention.
    pub fn expected_title_prefix(&self) -> String {
        format!("{} {}:", self.requirement_id, self.test_type.label())
    }
}

/// The canonical output handed to the export sink. Every downstream
/// format (CSV, Excel, Jira payloads) is built from this structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationResult {
    pub requirements: Vec<Requirement>,
    pub test_cases: Vec<TestCase>,
    pub critic_verdict: CriticVerdict,
    pub iterations_used: u32,
}

pub const MIN_STEPS_PER_CASE: usize = 1;
pub const MAX_STEPS_PER_CASE: usize = 6;
pub const CASES_PER_REQUIREMENT: usize = 3;
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 4;
