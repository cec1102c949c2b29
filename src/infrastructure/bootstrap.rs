//! Session wiring: one completion service shared by every use case,
//! built from explicit settings.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::application::use_cases::completion_service::CompletionService;
use crate::application::use_cases::epic_split_planner::EpicSplitService;
use crate::application::use_cases::refinement_loop::RefinementLoop;
use crate::application::use_cases::test_ticket_service::TestTicketService;
use crate::infrastructure::config::Settings;
use crate::infrastructure::llm_clients::{LLMClient, RouterClient};

/// The assembled generation pipeline. One per session; independent
/// sessions build independent pipelines and share nothing mutable.
pub struct Pipeline {
    pub refinement: RefinementLoop,
    pub epic_split: EpicSplitService,
    pub test_tickets: TestTicketService,
}

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("testbridge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .ok();
}

pub fn build_pipeline(settings: Settings) -> Pipeline {
    let client: Arc<dyn LLMClient + Send + Sync> = Arc::new(RouterClient::new());
    build_pipeline_with_client(settings, client)
}

/// Same wiring with an injected backend client, which is how tests and
/// alternative transports come in.
pub fn build_pipeline_with_client(
    settings: Settings,
    client: Arc<dyn LLMClient + Send + Sync>,
) -> Pipeline {
    let completion = Arc::new(CompletionService::with_config(
        client,
        settings.llm,
        settings.completion,
    ));
    Pipeline {
        refinement: RefinementLoop::with_config(completion.clone(), settings.refinement),
        epic_split: EpicSplitService::new(completion.clone()),
        test_tickets: TestTicketService::with_config(completion, settings.ticket_loop),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ticket::TicketContext;
    use crate::infrastructure::llm_clients::stub::StubClient;

    #[tokio::test]
    async fn test_pipeline_runs_a_ticket_end_to_end() {
        let client = Arc::new(StubClient::new());
        client.push_text(
            r#"{"requirements":[{"id":"REQ-001","description":"Password is required","source":"acceptance_criteria"}]}"#,
        );
        client.push_text(
            r#"{"test_cases":[
                {"requirement_id":"REQ-001","requirement_desc":"Password is required",
                 "title":"REQ-001 Positive: password accepted","priority":1,"test_type":"positive",
                 "tags":[],"steps":[{"action":"Enter password","expected":"Accepted"}]},
                {"requirement_id":"REQ-001","requirement_desc":"Password is required",
                 "title":"REQ-001 Negative: empty password rejected","priority":1,"test_type":"negative",
                 "tags":[],"steps":[{"action":"Leave password empty","expected":"Error shown"}]},
                {"requirement_id":"REQ-001","requirement_desc":"Password is required",
                 "title":"REQ-001 EdgeCase: whitespace-only password","priority":2,"test_type":"edge_case",
                 "tags":[],"steps":[{"action":"Enter spaces only","expected":"Error shown"}]}
            ]}"#,
        );
        client.push_text(
            r#"{"approved":true,"overall_quality":"good","confidence":95,"issues":[],
                "missing_scenarios":[],"summary":"complete","recommendation":"approve"}"#,
        );

        let pipeline = build_pipeline_with_client(Settings::default(), client);
        let ticket = TicketContext {
            summary: "Password field".to_string(),
            description: "Login requires a password.".to_string(),
            acceptance_criteria: vec!["Password is mandatory".to_string()],
            attachments_text: String::new(),
        };

        let outcome = pipeline.refinement.run(&ticket, None).await.unwrap();
        assert!(outcome.approved);
        assert_eq!(outcome.result.test_cases.len(), 3);

        // The canonical export payload serializes with stable keys.
        let json = serde_json::to_value(&outcome.result).unwrap();
        assert_eq!(json["iterations_used"], 1);
        assert_eq!(json["critic_verdict"]["approved"], true);
    }
}
