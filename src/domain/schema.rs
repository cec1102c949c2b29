//! Declared response shapes for each generation phase.
//!
//! A schema does double duty: it is forwarded to backends that support
//! constrained decoding, and its field names anchor the defensive parsing
//! on the way back. Instances are immutable and shared read-only across
//! concurrent loops.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct ArtifactSchema {
    pub name: &'static str,
    pub schema: Value,
}

static REQUIREMENTS: Lazy<ArtifactSchema> = Lazy::new(|| ArtifactSchema {
    name: "requirement_list",
    schema: json!({
        "type": "object",
        "properties": {
            "requirements": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "description": { "type": "string" },
                        "source": {
                            "type": "string",
                            "enum": ["acceptance_criteria", "description", "user_story"]
                        }
                    },
                    "required": ["id", "description", "source"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["requirements"],
        "additionalProperties": false
    }),
});

static TEST_CASES: Lazy<ArtifactSchema> = Lazy::new(|| ArtifactSchema {
    name: "test_case_list",
    schema: json!({
        "type": "object",
        "properties": {
            "test_cases": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "requirement_id": { "type": "string" },
                        "requirement_desc": { "type": "string" },
                        "title": { "type": "string" },
                        "priority": { "type": "integer", "minimum": 1, "maximum": 4 },
                        "test_type": {
                            "type": "string",
                            "enum": ["positive", "negative", "edge_case"]
                        },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "steps": {
                            "type": "array",
                            "minItems": 1,
                            "maxItems": 6,
                            "items": {
                                "type": "object",
                                "properties": {
                                    "action": { "type": "string" },
                                    "expected": { "type": "string" }
                                },
                                "required": ["action", "expected"],
                                "additionalProperties": false
                            }
                        }
                    },
                    "required": [
                        "requirement_id", "requirement_desc", "title",
                        "priority", "test_type", "tags", "steps"
                    ],
                    "additionalProperties": false
                }
            }
        },
        "required": ["test_cases"],
        "additionalProperties": false
    }),
});

static CRITIC_VERDICT: Lazy<ArtifactSchema> = Lazy::new(|| ArtifactSchema {
    name: "critic_verdict",
    schema: json!({
        "type": "object",
        "properties": {
            "approved": { "type": "boolean" },
            "overall_quality": {
                "type": "string",
                "enum": ["excellent", "good", "needs_improvement", "poor"]
            },
            "confidence": { "type": "integer", "minimum": 0, "maximum": 100 },
            "issues": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "severity": { "type": "string", "enum": ["critical", "major", "minor"] },
                        "kind": {
                            "type": "string",
                            "enum": [
                                "formula_violation", "missing_field", "step_count",
                                "distribution_mismatch", "dangling_reference"
                            ]
                        },
                        "subject": { "type": "string" },
                        "message": { "type": "string" },
                        "suggestion": { "type": "string" }
                    },
                    "required": ["severity", "kind", "subject", "message", "suggestion"],
                    "additionalProperties": false
                }
            },
            "missing_scenarios": { "type": "array", "items": { "type": "string" } },
            "summary": { "type": "string" },
            "recommendation": { "type": "string" }
        },
        "required": [
            "approved", "overall_quality", "confidence",
            "issues", "missing_scenarios", "summary", "recommendation"
        ],
        "additionalProperties": false
    }),
});

static SPLIT_STRATEGIES: Lazy<ArtifactSchema> = Lazy::new(|| ArtifactSchema {
    name: "split_strategy_list",
    schema: json!({
        "type": "object",
        "properties": {
            "strategies": {
                "type": "array",
                "minItems": 2,
                "maxItems": 5,
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "groups": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "functional_area": { "type": "string" },
                                    "ticket_keys": {
                                        "type": "array",
                                        "items": { "type": "string" }
                                    },
                                    "estimated_test_cases": {
                                        "type": "integer", "minimum": 1
                                    },
                                    "rationale": { "type": "string" }
                                },
                                "required": [
                                    "functional_area", "ticket_keys",
                                    "estimated_test_cases", "rationale"
                                ],
                                "additionalProperties": false
                            }
                        }
                    },
                    "required": ["name", "groups"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["strategies"],
        "additionalProperties": false
    }),
});

static STRATEGY_SCORE: Lazy<ArtifactSchema> = Lazy::new(|| ArtifactSchema {
    name: "strategy_score",
    schema: json!({
        "type": "object",
        "properties": {
            "testability": { "type": "integer", "minimum": 0, "maximum": 10 },
            "coverage": { "type": "integer", "minimum": 0, "maximum": 10 },
            "manageability": { "type": "integer", "minimum": 0, "maximum": 10 },
            "independence": { "type": "integer", "minimum": 0, "maximum": 10 },
            "parallelizability": { "type": "integer", "minimum": 0, "maximum": 10 }
        },
        "required": [
            "testability", "coverage", "manageability",
            "independence", "parallelizability"
        ],
        "additionalProperties": false
    }),
});

static TEST_TICKET: Lazy<ArtifactSchema> = Lazy::new(|| ArtifactSchema {
    name: "test_ticket_draft",
    schema: json!({
        "type": "object",
        "properties": {
            "functional_area": { "type": "string" },
            "summary": { "type": "string" },
            "description": { "type": "string" },
            "acceptance_criteria": {
                "type": "array",
                "minItems": 5,
                "maxItems": 8,
                "items": { "type": "string" }
            }
        },
        "required": ["functional_area", "summary", "description", "acceptance_criteria"],
        "additionalProperties": false
    }),
});

static TICKET_REVIEW: Lazy<ArtifactSchema> = Lazy::new(|| ArtifactSchema {
    name: "ticket_review",
    schema: json!({
        "type": "object",
        "properties": {
            "quality_score": { "type": "integer", "minimum": 0, "maximum": 100 },
            "issues": { "type": "array", "items": { "type": "string" } },
            "summary": { "type": "string" }
        },
        "required": ["quality_score", "issues", "summary"],
        "additionalProperties": false
    }),
});

impl ArtifactSchema {
    pub fn requirements() -> &'static ArtifactSchema {
        &REQUIREMENTS
    }

    pub fn test_cases() -> &'static ArtifactSchema {
        &TEST_CASES
    }

    pub fn critic_verdict() -> &'static ArtifactSchema {
        &CRITIC_VERDICT
    }

    pub fn split_strategies() -> &'static ArtifactSchema {
        &SPLIT_STRATEGIES
    }

    pub fn strategy_score() -> &'static ArtifactSchema {
        &STRATEGY_SCORE
    }

    pub fn test_ticket() -> &'static ArtifactSchema {
        &TEST_TICKET
    }

    pub fn ticket_review() -> &'static ArtifactSchema {
        &TICKET_REVIEW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_declare_required_top_level_keys() {
        let schema = &ArtifactSchema::test_cases().schema;
        assert_eq!(schema["required"][0], "test_cases");
        let steps = &schema["properties"]["test_cases"]["items"]["properties"]["steps"];
        assert_eq!(steps["minItems"], 1);
        assert_eq!(steps["maxItems"], 6);
    }

    #[test]
    fn test_verdict_schema_bounds_confidence() {
        let schema = &ArtifactSchema::critic_verdict().schema;
        assert_eq!(schema["properties"]["confidence"]["minimum"], 0);
        assert_eq!(schema["properties"]["confidence"]["maximum"], 100);
    }
}
