//! Epic-level split planning: propose candidate groupings of child
//! tickets, score each candidate, keep the best.
//!
//! Scoring calls are independent reads over the same epic context, so
//! they are the one place in the pipeline that fans out concurrently.
//! Results aggregate order-independently; ranking is computed locally
//! from the per-dimension scores.

use crate::application::use_cases::completion_service::CompletionService;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_run::LlmRunRecord;
use crate::domain::schema::ArtifactSchema;
use crate::domain::test_ticket::{ScoredStrategy, SplitStrategy, StrategyScore};
use crate::domain::ticket::EpicContext;
use crate::infrastructure::response::{extract_embedded_object, extract_json_payload, preview_text};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use validator::Validate;

const PROMPT_VERSION: &str = "v1";
const PLANNING_MAX_TOKENS: u32 = 4096;
const SCORING_MAX_TOKENS: u32 = 1024;

const MIN_STRATEGIES: usize = 2;
const MAX_STRATEGIES: usize = 5;

pub struct EpicSplitPlanner {
    completion: Arc<CompletionService>,
}

impl EpicSplitPlanner {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self { completion }
    }

    /// One completion call proposing 2-5 alternative split strategies.
    /// Strategies that reference ticket keys the Epic does not contain
    /// are dropped; fewer proposals than asked for is tolerated, none at
    /// all is an error.
    pub async fn propose(
        &self,
        epic: &EpicContext,
    ) -> Result<(Vec<SplitStrategy>, LlmRunRecord)> {
        let system_prompt = build_planner_system_prompt();
        let user_prompt = build_planner_user_prompt(epic);

        let output = self
            .completion
            .complete(
                &system_prompt,
                &user_prompt,
                PLANNING_MAX_TOKENS,
                Some(ArtifactSchema::split_strategies()),
            )
            .await?;

        let mut strategies = parse_strategies(&output)?;

        let known: HashSet<&str> = epic.child_keys().into_iter().collect();
        strategies.retain(|strategy| {
            let unknown: Vec<&str> = strategy
                .groups
                .iter()
                .flat_map(|group| group.ticket_keys.iter())
                .map(String::as_str)
                .filter(|key| !known.contains(key))
                .collect();
            if unknown.is_empty() {
                true
            } else {
                warn!(
                    strategy = %strategy.name,
                    unknown_keys = ?unknown,
                    "Dropping strategy referencing tickets outside the Epic"
                );
                false
            }
        });

        if strategies.is_empty() {
            return Err(AppError::ValidationError(
                "Planner produced no usable split strategy".to_string(),
            ));
        }
        if strategies.len() < MIN_STRATEGIES {
            warn!(
                count = strategies.len(),
                "Planner proposed fewer strategies than requested"
            );
        }
        if strategies.len() > MAX_STRATEGIES {
            warn!(
                count = strategies.len(),
                "Planner proposed too many strategies, keeping the first {}",
                MAX_STRATEGIES
            );
            strategies.truncate(MAX_STRATEGIES);
        }

        let record = LlmRunRecord::new(
            "split_plan",
            epic.key.clone(),
            self.completion.model(),
            PROMPT_VERSION,
            format!(
                "epic={} children={} strategies={}",
                epic.key,
                epic.child_tickets.len(),
                strategies.len()
            ),
        );

        Ok((strategies, record))
    }
}

pub struct SplitEvaluator {
    completion: Arc<CompletionService>,
}

impl SplitEvaluator {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self { completion }
    }

    pub async fn score(
        &self,
        epic: &EpicContext,
        strategy: &SplitStrategy,
    ) -> Result<(StrategyScore, LlmRunRecord)> {
        let system_prompt = build_scorer_system_prompt();
        let user_prompt = build_scorer_user_prompt(epic, strategy);

        let output = self
            .completion
            .complete(
                &system_prompt,
                &user_prompt,
                SCORING_MAX_TOKENS,
                Some(ArtifactSchema::strategy_score()),
            )
            .await?;

        let score = parse_score(&output)?;

        let record = LlmRunRecord::new(
            "split_score",
            epic.key.clone(),
            self.completion.model(),
            PROMPT_VERSION,
            format!(
                "epic={} strategy={} overall={:.2}",
                epic.key,
                strategy.name,
                score.overall()
            ),
        );

        Ok((score, record))
    }
}

/// The chosen strategy plus the ranked alternatives, for a human to
/// override the automatic pick.
#[derive(Debug)]
pub struct SplitSelection {
    pub chosen: ScoredStrategy,
    pub alternatives: Vec<ScoredStrategy>,
    pub runs: Vec<LlmRunRecord>,
}

pub struct EpicSplitService {
    planner: EpicSplitPlanner,
    evaluator: Arc<SplitEvaluator>,
}

impl EpicSplitService {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self {
            planner: EpicSplitPlanner::new(completion.clone()),
            evaluator: Arc::new(SplitEvaluator::new(completion)),
        }
    }

    /// Propose strategies, score them concurrently, pick the highest
    /// overall score (earliest proposal wins ties). A transport failure
    /// in any scoring call fails the selection: a partially scored
    /// ranking would silently bias the pick.
    pub async fn select_strategy(&self, epic: &EpicContext) -> Result<SplitSelection> {
        epic.validate()
            .map_err(|err| AppError::ValidationError(err.to_string()))?;

        let (strategies, plan_record) = self.planner.propose(epic).await?;
        let mut runs = vec![plan_record];

        let shared_epic = Arc::new(epic.clone());
        let mut join_set = JoinSet::new();
        for (index, strategy) in strategies.into_iter().enumerate() {
            let evaluator = self.evaluator.clone();
            let epic = shared_epic.clone();
            join_set.spawn(async move {
                let result = evaluator.score(&epic, &strategy).await;
                (index, strategy, result)
            });
        }

        let mut scored: Vec<Option<ScoredStrategy>> = Vec::new();
        let mut score_runs: Vec<Option<LlmRunRecord>> = Vec::new();
        let mut first_error: Option<(usize, AppError)> = None;

        while let Some(joined) = join_set.join_next().await {
            let (index, strategy, result) = joined
                .map_err(|err| AppError::Internal(format!("Scoring task failed: {}", err)))?;
            if scored.len() <= index {
                scored.resize_with(index + 1, || None);
                score_runs.resize_with(index + 1, || None);
            }
            match result {
                Ok((score, record)) => {
                    debug!(strategy = %strategy.name, overall = score.overall(), "Strategy scored");
                    scored[index] = Some(ScoredStrategy {
                        overall: score.overall(),
                        strategy,
                        score,
                    });
                    score_runs[index] = Some(record);
                }
                Err(err) => {
                    let is_earlier = first_error
                        .as_ref()
                        .map(|(earliest, _)| index < *earliest)
                        .unwrap_or(true);
                    if is_earlier {
                        first_error = Some((index, err));
                    }
                }
            }
        }

        if let Some((_, err)) = first_error {
            return Err(err);
        }

        runs.extend(score_runs.into_iter().flatten());
        let mut ranked: Vec<ScoredStrategy> = scored.into_iter().flatten().collect();

        let best_index = ranked
            .iter()
            .enumerate()
            .max_by(|(index_a, a), (index_b, b)| {
                a.overall
                    .partial_cmp(&b.overall)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(index_b.cmp(index_a))
            })
            .map(|(index, _)| index)
            .ok_or_else(|| AppError::Internal("No strategy survived scoring".to_string()))?;

        let chosen = ranked.remove(best_index);
        Ok(SplitSelection {
            chosen,
            alternatives: ranked,
            runs,
        })
    }
}

fn build_planner_system_prompt() -> String {
    format!(
        "You are a QA strategist splitting a Jira Epic into functional test tickets.\n\
         Propose {} to {} alternative split strategies. Each strategy assigns every child ticket to exactly one functional area group.\n\
         Size each group to roughly 15-30 estimated test cases; give each group a one-sentence rationale.\n\
         Use only the child ticket keys provided.\n\
         Return only JSON: {{\"strategies\": [{{\"name\", \"groups\": [{{\"functional_area\", \"ticket_keys\", \"estimated_test_cases\", \"rationale\"}}]}}]}}.",
        MIN_STRATEGIES, MAX_STRATEGIES
    )
}

fn build_planner_user_prompt(epic: &EpicContext) -> String {
    let mut body = String::new();
    body.push_str(&format!("Epic {}: {}\n", epic.key, epic.summary));
    if !epic.description.trim().is_empty() {
        body.push_str(&format!("\n{}\n", epic.description));
    }
    body.push_str("\nChild tickets:\n");
    for child in &epic.child_tickets {
        body.push_str(&format!("- {}: {}\n", child.key, child.summary));
    }
    body
}

fn build_scorer_system_prompt() -> String {
    "You are evaluating one proposed split of an Epic into functional test tickets.\n\
     Score it 0-10 on each dimension:\n\
     - testability: can each group be tested as a coherent unit?\n\
     - coverage: do the groups jointly cover everything the child tickets describe?\n\
     - manageability: are groups sized sensibly (roughly 15-30 test cases each)?\n\
     - independence: can groups be tested without depending on each other?\n\
     - parallelizability: could separate testers work the groups simultaneously?\n\
     Return only JSON: {\"testability\", \"coverage\", \"manageability\", \"independence\", \"parallelizability\"}."
        .to_string()
}

fn build_scorer_user_prompt(epic: &EpicContext, strategy: &SplitStrategy) -> String {
    let mut body = String::new();
    body.push_str(&format!("Epic {}: {}\n", epic.key, epic.summary));
    body.push_str("\nChild tickets:\n");
    for child in &epic.child_tickets {
        body.push_str(&format!("- {}: {}\n", child.key, child.summary));
    }
    body.push_str(&format!("\nProposed strategy \"{}\":\n", strategy.name));
    for group in &strategy.groups {
        body.push_str(&format!(
            "- {} ({} est. cases): {} [{}]\n",
            group.functional_area,
            group.estimated_test_cases,
            group.rationale,
            group.ticket_keys.join(", ")
        ));
    }
    body
}

#[derive(Debug, Deserialize)]
struct PlannerOutput {
    #[serde(default)]
    strategies: Vec<SplitStrategy>,
}

fn parse_strategies(output: &str) -> Result<Vec<SplitStrategy>> {
    let payload = extract_json_payload(output);
    if let Ok(parsed) = serde_json::from_str::<PlannerOutput>(&payload) {
        return Ok(parsed.strategies);
    }
    if let Some(embedded) = extract_embedded_object(&payload) {
        if let Ok(parsed) = serde_json::from_str::<PlannerOutput>(&embedded) {
            return Ok(parsed.strategies);
        }
    }
    Err(AppError::ParseError(format!(
        "Failed to parse split strategies | output_snippet={}",
        preview_text(&payload, 600)
    )))
}

fn parse_score(output: &str) -> Result<StrategyScore> {
    let payload = extract_json_payload(output);
    if let Ok(score) = serde_json::from_str::<StrategyScore>(&payload) {
        return Ok(score);
    }

    // Permissive pass: clamp out-of-range values instead of failing, but
    // every dimension must be present.
    let candidate = extract_embedded_object(&payload).unwrap_or_else(|| payload.clone());
    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        let dimension = |name: &str| -> Option<u8> {
            value.get(name).and_then(Value::as_u64).map(|raw| raw.min(10) as u8)
        };
        if let (Some(testability), Some(coverage), Some(manageability), Some(independence), Some(parallelizability)) = (
            dimension("testability"),
            dimension("coverage"),
            dimension("manageability"),
            dimension("independence"),
            dimension("parallelizability"),
        ) {
            return Ok(StrategyScore {
                testability,
                coverage,
                manageability,
                independence,
                parallelizability,
            });
        }
    }

    Err(AppError::ParseError(format!(
        "Failed to parse strategy score | output_snippet={}",
        preview_text(&payload, 600)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::completion_service::CompletionConfig;
    use crate::domain::llm_config::LLMConfig;
    use crate::domain::ticket::ChildTicket;
    use crate::infrastructure::llm_clients::stub::StubClient;
    use crate::infrastructure::llm_clients::LLMClient;
    use std::sync::Mutex;

    fn epic() -> EpicContext {
        EpicContext {
            key: "SHOP-100".to_string(),
            summary: "Checkout redesign".to_string(),
            description: String::new(),
            child_tickets: vec![
                ChildTicket {
                    key: "SHOP-101".to_string(),
                    summary: "Cart page".to_string(),
                    description: String::new(),
                },
                ChildTicket {
                    key: "SHOP-102".to_string(),
                    summary: "Payment form".to_string(),
                    description: String::new(),
                },
                ChildTicket {
                    key: "SHOP-103".to_string(),
                    summary: "Order confirmation".to_string(),
                    description: String::new(),
                },
            ],
        }
    }

    fn strategies_json() -> String {
        r#"{"strategies":[
            {"name":"By page","groups":[
                {"functional_area":"Cart","ticket_keys":["SHOP-101"],"estimated_test_cases":18,"rationale":"cart flows"},
                {"functional_area":"Payment and confirmation","ticket_keys":["SHOP-102","SHOP-103"],"estimated_test_cases":25,"rationale":"money path"}]},
            {"name":"By risk","groups":[
                {"functional_area":"Money path","ticket_keys":["SHOP-102"],"estimated_test_cases":22,"rationale":"high risk"},
                {"functional_area":"Browsing","ticket_keys":["SHOP-101","SHOP-103"],"estimated_test_cases":20,"rationale":"lower risk"}]}
        ]}"#
        .to_string()
    }

    fn completion(client: Arc<dyn LLMClient + Send + Sync>) -> Arc<CompletionService> {
        Arc::new(CompletionService::with_config(
            client,
            LLMConfig::default(),
            CompletionConfig {
                max_retries: 0,
                retry_delay_ms: 0,
            },
        ))
    }

    #[tokio::test]
    async fn test_propose_parses_strategies() {
        let client = Arc::new(StubClient::with_fallback(strategies_json()));
        let planner = EpicSplitPlanner::new(completion(client));
        let (strategies, record) = planner.propose(&epic()).await.unwrap();
        assert_eq!(strategies.len(), 2);
        assert_eq!(strategies[0].name, "By page");
        assert_eq!(record.scope, "split_plan");
    }

    #[tokio::test]
    async fn test_propose_drops_strategies_with_unknown_keys() {
        let json = r#"{"strategies":[
            {"name":"Good","groups":[{"functional_area":"Cart","ticket_keys":["SHOP-101","SHOP-102","SHOP-103"],"estimated_test_cases":20,"rationale":"all"}]},
            {"name":"Hallucinated","groups":[{"functional_area":"Ghost","ticket_keys":["SHOP-999"],"estimated_test_cases":20,"rationale":"nope"}]}
        ]}"#;
        let client = Arc::new(StubClient::with_fallback(json));
        let planner = EpicSplitPlanner::new(completion(client));
        let (strategies, _) = planner.propose(&epic()).await.unwrap();
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].name, "Good");
    }

    #[tokio::test]
    async fn test_propose_with_no_usable_strategy_is_an_error() {
        let json = r#"{"strategies":[
            {"name":"Hallucinated","groups":[{"functional_area":"Ghost","ticket_keys":["SHOP-999"],"estimated_test_cases":20,"rationale":"nope"}]}
        ]}"#;
        let client = Arc::new(StubClient::with_fallback(json));
        let planner = EpicSplitPlanner::new(completion(client));
        let err = planner.propose(&epic()).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_parse_score_clamps_out_of_range_values() {
        let score = parse_score(r#"{"testability":14,"coverage":9,"manageability":8,"independence":7,"parallelizability":6}"#).unwrap();
        assert_eq!(score.testability, 10);
        assert_eq!(score.coverage, 9);
    }

    #[test]
    fn test_parse_score_requires_every_dimension() {
        assert!(matches!(
            parse_score(r#"{"testability":9}"#),
            Err(AppError::ParseError(_))
        ));
    }

    /// Serves the planner JSON on the first call, then scores each
    /// strategy by name so concurrent completion order cannot matter.
    struct ScoreByNameClient {
        first_call_done: Mutex<bool>,
        strategies: String,
    }

    #[async_trait::async_trait]
    impl LLMClient for ScoreByNameClient {
        async fn generate(
            &self,
            _config: &LLMConfig,
            _system: &str,
            user: &str,
            _schema: Option<&ArtifactSchema>,
        ) -> crate::domain::error::Result<String> {
            let mut first = self.first_call_done.lock().unwrap();
            if !*first {
                *first = true;
                return Ok(self.strategies.clone());
            }
            drop(first);
            let score = if user.contains("\"By risk\"") {
                r#"{"testability":9,"coverage":9,"manageability":9,"independence":9,"parallelizability":9}"#
            } else {
                r#"{"testability":5,"coverage":5,"manageability":5,"independence":5,"parallelizability":5}"#
            };
            Ok(score.to_string())
        }
    }

    #[tokio::test]
    async fn test_select_strategy_picks_highest_overall() {
        let client = Arc::new(ScoreByNameClient {
            first_call_done: Mutex::new(false),
            strategies: strategies_json(),
        });
        let service = EpicSplitService::new(completion(client));
        let selection = service.select_strategy(&epic()).await.unwrap();
        assert_eq!(selection.chosen.strategy.name, "By risk");
        assert!((selection.chosen.overall - 9.0).abs() < 1e-9);
        assert_eq!(selection.alternatives.len(), 1);
        // Planner run + one scoring run per strategy.
        assert_eq!(selection.runs.len(), 3);
    }

    /// Equal scores: the first-proposed strategy wins the tie.
    struct FlatScoreClient {
        first_call_done: Mutex<bool>,
        strategies: String,
    }

    #[async_trait::async_trait]
    impl LLMClient for FlatScoreClient {
        async fn generate(
            &self,
            _config: &LLMConfig,
            _system: &str,
            _user: &str,
            _schema: Option<&ArtifactSchema>,
        ) -> crate::domain::error::Result<String> {
            let mut first = self.first_call_done.lock().unwrap();
            if !*first {
                *first = true;
                return Ok(self.strategies.clone());
            }
            Ok(r#"{"testability":7,"coverage":7,"manageability":7,"independence":7,"parallelizability":7}"#.to_string())
        }
    }

    #[tokio::test]
    async fn test_select_strategy_tie_goes_to_first_proposed() {
        let client = Arc::new(FlatScoreClient {
            first_call_done: Mutex::new(false),
            strategies: strategies_json(),
        });
        let service = EpicSplitService::new(completion(client));
        let selection = service.select_strategy(&epic()).await.unwrap();
        assert_eq!(selection.chosen.strategy.name, "By page");
    }
}
