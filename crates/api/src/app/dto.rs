//! Request bodies and JSON mapping helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use ripple_core::{EventId, Money, ProjectId};
use ripple_events::EmitReceipt;
use ripple_infra::{Project, Versioned};

/// `POST /events`
#[derive(Debug, Deserialize)]
pub struct EmitEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: JsonValue,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmitEventResponse {
    pub event_id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub hop: u8,
    pub handlers_invoked: usize,
    pub handlers_failed: usize,
}

impl From<&EmitReceipt> for EmitEventResponse {
    fn from(receipt: &EmitReceipt) -> Self {
        Self {
            event_id: receipt.event_id(),
            event_type: receipt.envelope.event_type().to_string(),
            hop: receipt.envelope.hop(),
            handlers_invoked: receipt.handlers_invoked,
            handlers_failed: receipt.handlers_failed,
        }
    }
}

/// `GET /events?limit=N`
#[derive(Debug, Default, Deserialize)]
pub struct RecentEventsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    /// Minor units.
    pub budget: Money,
}

#[derive(Debug, Deserialize)]
pub struct CreateExpenseRequest {
    pub project_id: Option<ProjectId>,
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
pub struct UpdateExpenseRequest {
    pub project_id: Option<ProjectId>,
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetCompletedRequest {
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetBudgetRequest {
    pub budget: Money,
}

/// A project as stored, with its document version.
#[derive(Debug, Serialize)]
pub struct ProjectView<'a> {
    #[serde(flatten)]
    pub project: &'a Project,
    pub version: u64,
}

impl<'a> From<&'a Versioned<Project>> for ProjectView<'a> {
    fn from(stored: &'a Versioned<Project>) -> Self {
        Self {
            project: &stored.doc,
            version: stored.version,
        }
    }
}
