//! Event type registry: the tagged union of known payloads.
//!
//! The bus dispatches opaque envelopes; handlers recover the strongly-typed
//! payload by matching on [`EventPayload`]. Modules that are not modelled here
//! still emit freely through [`EventPayload::Custom`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use ripple_core::{CustomerId, ExpenseId, InvoiceId, LeadId, Money, ProjectId, TaskId};

use crate::error::EmissionError;

/// Namespaced event type tags.
pub mod types {
    pub const EXPENSE_CREATED: &str = "expense:created";
    pub const EXPENSE_UPDATED: &str = "expense:updated";
    pub const EXPENSE_DELETED: &str = "expense:deleted";
    pub const TASK_CREATED: &str = "task:created";
    pub const TASK_UPDATED: &str = "task:updated";
    pub const TASK_DELETED: &str = "task:deleted";
    pub const PROJECT_CREATED: &str = "project:created";
    pub const PROJECT_UPDATED: &str = "project:updated";
    pub const INVOICE_PAID: &str = "invoice:paid";
    pub const LEAD_CONVERTED: &str = "lead:converted";
}

/// An expense was written. `project_id` is absent for unlinked expenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseChanged {
    pub expense_id: ExpenseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    /// Set when an update moved the expense away from another project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_project_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
}

/// A task was written. `project_id` is absent for unlinked tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskChanged {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_project_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectChanged {
    pub project_id: ProjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePaid {
    pub invoice_id: InvoiceId,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadConverted {
    pub lead_id: LeadId,
    pub customer_id: CustomerId,
}

/// Payload of an event, keyed by its type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    ExpenseCreated(ExpenseChanged),
    ExpenseUpdated(ExpenseChanged),
    ExpenseDeleted(ExpenseChanged),
    TaskCreated(TaskChanged),
    TaskUpdated(TaskChanged),
    TaskDeleted(TaskChanged),
    ProjectCreated(ProjectChanged),
    ProjectUpdated(ProjectChanged),
    InvoicePaid(InvoicePaid),
    LeadConverted(LeadConverted),
    /// Any event type without a dedicated variant.
    Custom { event_type: String, data: JsonValue },
}

impl EventPayload {
    pub fn custom(event_type: impl Into<String>, data: JsonValue) -> Self {
        Self::Custom {
            event_type: event_type.into(),
            data,
        }
    }

    /// The namespaced type tag (e.g. `"invoice:paid"`).
    pub fn event_type(&self) -> &str {
        match self {
            Self::ExpenseCreated(_) => types::EXPENSE_CREATED,
            Self::ExpenseUpdated(_) => types::EXPENSE_UPDATED,
            Self::ExpenseDeleted(_) => types::EXPENSE_DELETED,
            Self::TaskCreated(_) => types::TASK_CREATED,
            Self::TaskUpdated(_) => types::TASK_UPDATED,
            Self::TaskDeleted(_) => types::TASK_DELETED,
            Self::ProjectCreated(_) => types::PROJECT_CREATED,
            Self::ProjectUpdated(_) => types::PROJECT_UPDATED,
            Self::InvoicePaid(_) => types::INVOICE_PAID,
            Self::LeadConverted(_) => types::LEAD_CONVERTED,
            Self::Custom { event_type, .. } => event_type,
        }
    }

    /// Recover a typed payload from a raw `(type, json)` pair.
    ///
    /// Unknown types become [`EventPayload::Custom`]; a known type whose data
    /// does not fit is rejected.
    pub fn from_raw(event_type: &str, data: JsonValue) -> Result<Self, EmissionError> {
        validate_event_type(event_type)?;

        let payload = match event_type {
            types::EXPENSE_CREATED => Self::ExpenseCreated(decode(event_type, data)?),
            types::EXPENSE_UPDATED => Self::ExpenseUpdated(decode(event_type, data)?),
            types::EXPENSE_DELETED => Self::ExpenseDeleted(decode(event_type, data)?),
            types::TASK_CREATED => Self::TaskCreated(decode(event_type, data)?),
            types::TASK_UPDATED => Self::TaskUpdated(decode(event_type, data)?),
            types::TASK_DELETED => Self::TaskDeleted(decode(event_type, data)?),
            types::PROJECT_CREATED => Self::ProjectCreated(decode(event_type, data)?),
            types::PROJECT_UPDATED => Self::ProjectUpdated(decode(event_type, data)?),
            types::INVOICE_PAID => Self::InvoicePaid(decode(event_type, data)?),
            types::LEAD_CONVERTED => Self::LeadConverted(decode(event_type, data)?),
            other => Self::custom(other, data),
        };

        Ok(payload)
    }

    /// Decode a [`EventPayload::Custom`] whose tag has a dedicated variant, so
    /// handlers matching on the typed variant see it. Other payloads pass
    /// through untouched.
    pub fn normalize(self) -> Result<Self, EmissionError> {
        match self {
            Self::Custom { event_type, data } => Self::from_raw(&event_type, data),
            typed => Ok(typed),
        }
    }

    /// The payload's data as JSON (without the type tag).
    pub fn data_json(&self) -> JsonValue {
        let encoded = match self {
            Self::ExpenseCreated(p) | Self::ExpenseUpdated(p) | Self::ExpenseDeleted(p) => {
                serde_json::to_value(p)
            }
            Self::TaskCreated(p) | Self::TaskUpdated(p) | Self::TaskDeleted(p) => {
                serde_json::to_value(p)
            }
            Self::ProjectCreated(p) | Self::ProjectUpdated(p) => serde_json::to_value(p),
            Self::InvoicePaid(p) => serde_json::to_value(p),
            Self::LeadConverted(p) => serde_json::to_value(p),
            Self::Custom { data, .. } => return data.clone(),
        };
        // Plain structs of ids, options and integers always encode.
        encoded.unwrap_or(JsonValue::Null)
    }
}

fn decode<T: DeserializeOwned>(event_type: &str, data: JsonValue) -> Result<T, EmissionError> {
    serde_json::from_value(data).map_err(|e| EmissionError::MalformedPayload {
        event_type: event_type.to_string(),
        reason: e.to_string(),
    })
}

/// Reject empty tags and tags containing whitespace, control characters or
/// the `*` wildcard, which is reserved for subscription patterns.
pub fn validate_event_type(event_type: &str) -> Result<(), EmissionError> {
    if event_type.trim().is_empty() {
        return Err(EmissionError::MissingType);
    }
    if event_type
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '*')
    {
        return Err(EmissionError::InvalidType(event_type.to_string()));
    }
    Ok(())
}
