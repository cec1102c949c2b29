use serde::{Deserialize, Serialize};
use validator::Validate;

/// Ticket content as delivered by the fetching collaborator. Attachment
/// content arrives pre-flattened to text (images and documents are
/// summarized upstream); this core never parses file formats.
#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct TicketContext {
    #[validate(length(min = 1, message = "Ticket summary is required"))]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub attachments_text: String,
}

impl TicketContext {
    pub fn has_acceptance_criteria(&self) -> bool {
        self.acceptance_criteria
            .iter()
            .any(|block| !block.trim().is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChildTicket {
    pub key: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
}

/// An Epic plus its child tickets, the input of the split/generate/review
/// loop.
#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct EpicContext {
    #[validate(length(min = 1, message = "Epic key is required"))]
    pub key: String,
    #[validate(length(min = 1, message = "Epic summary is required"))]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, message = "Epic has no child tickets to split"))]
    pub child_tickets: Vec<ChildTicket>,
}

impl EpicContext {
    pub fn child_keys(&self) -> Vec<&str> {
        self.child_tickets
            .iter()
            .map(|ticket| ticket.key.as_str())
            .collect()
    }
}
