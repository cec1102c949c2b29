pub mod use_cases;

pub use use_cases::completion_service::{CompletionConfig, CompletionService};
pub use use_cases::critic_reviewer::CriticReviewer;
pub use use_cases::epic_split_planner::{
    EpicSplitPlanner, EpicSplitService, SplitEvaluator, SplitSelection,
};
pub use use_cases::refinement_loop::{RefinementConfig, RefinementLoop, RefinementOutcome};
pub use use_cases::requirement_extractor::RequirementExtractor;
pub use use_cases::structural_validator::StructuralValidator;
pub use use_cases::test_case_generator::TestCaseGenerator;
pub use use_cases::test_ticket_service::{
    TestTicketGenerator, TestTicketOutcome, TestTicketReviewer, TestTicketService,
    TicketLoopConfig,
};
