//! Consistency triggers: recompute a parent's derived fields from its full
//! child set whenever a child changes.
//!
//! ## Why full re-query
//!
//! A trigger never applies deltas. Every run re-reads the authoritative child
//! set inside the parent's unit of work, so duplicate deliveries, retries and
//! missed events all converge to the same value.
//!
//! ## Concurrency
//!
//! Two racing child writes each fire their own trigger. Whichever commits
//! second either read the parent after the first commit (and therefore also
//! saw the first child), or fails its conditional write with a conflict and
//! re-runs the whole cycle. Either way the last commit reflects both children.
//!
//! ## Failure handling
//!
//! - No parent on the event: skipped (debug log)
//! - Parent missing: [`TriggerError::ParentNotFound`], warned, not retried
//! - Conflict: retried per [`RetryPolicy`](crate::retry::RetryPolicy); once
//!   exhausted, [`TriggerError::Unresolved`] is logged at error level for
//!   manual reconciliation
//! - Derived value out of range: [`TriggerError::Overflow`], logged at error
//!   level, parent left untouched
//!
//! The originating child write is never rolled back for any of these.

pub mod budget;
pub mod progress;
pub mod runner;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use ripple_automation::{AgentDefinition, AgentError, AgentRegistry, RegistryError};
use ripple_core::{AgentId, DomainError, Entity, ProjectId};
use ripple_events::{EventEnvelope, SubscriptionPattern};

use crate::model::Document;
use crate::store::{ChildQuery, ParentStore, Recompute, StoreError};

pub use budget::BudgetTrigger;
pub use progress::{ProgressTrigger, progress_percent};
pub use runner::{ParentReport, TriggerReport, TriggerRunner};

/// A derived-aggregate recomputation bound to child-write events.
pub trait ConsistencyTrigger: Send + Sync + 'static {
    type Parent: Document;
    type Child: Send + Sync + 'static;

    /// Slug used as the agent id (e.g. `"budget-aggregation"`).
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn bound_event_types(&self) -> Vec<SubscriptionPattern>;

    /// Parents affected by `event`: the current parent and, when a child
    /// moved, the one it left. Empty when the child is unlinked.
    fn parent_ids(&self, event: &EventEnvelope) -> Vec<<Self::Parent as Entity>::Id>;

    fn recompute(
        &self,
        parent: &Self::Parent,
        children: &[Self::Child],
        now: DateTime<Utc>,
    ) -> Result<Recompute<Self::Parent>, RecomputeError>;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeError {
    #[error("{field} does not fit in the value range")]
    Overflow { field: &'static str },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("trigger '{trigger}': parent {parent_id} not found")]
    ParentNotFound { trigger: String, parent_id: String },

    #[error("trigger '{trigger}': parent {parent_id} still conflicting after {attempts} attempts")]
    Unresolved {
        trigger: String,
        parent_id: String,
        attempts: u32,
    },

    #[error("trigger '{trigger}': {field} of parent {parent_id} overflowed")]
    Overflow {
        trigger: String,
        parent_id: String,
        field: &'static str,
    },

    #[error("trigger '{trigger}': {source}")]
    Store { trigger: String, source: StoreError },
}

#[derive(Debug, Error)]
pub enum RegisterTriggerError {
    #[error("invalid trigger name: {0}")]
    InvalidName(#[from] DomainError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Current and previous parent, deduplicated, unlinked sides dropped.
pub(crate) fn linked_parents(current: Option<ProjectId>, previous: Option<ProjectId>) -> Vec<ProjectId> {
    let mut parents: Vec<ProjectId> = current.into_iter().collect();
    if let Some(prev) = previous {
        if !parents.contains(&prev) {
            parents.push(prev);
        }
    }
    parents
}

/// Register `runner` as an agent so it can be toggled, counted and timed out
/// like any other automation unit.
///
/// A missing parent is already logged by the runner and does not count as an
/// agent failure; unresolved conflicts and store faults do.
pub fn register_trigger<T, S>(
    registry: &AgentRegistry,
    runner: Arc<TriggerRunner<T, S>>,
    timeout: Option<Duration>,
) -> Result<AgentId, RegisterTriggerError>
where
    T: ConsistencyTrigger,
    S: ParentStore<T::Parent> + ChildQuery<T::Parent, T::Child> + 'static,
{
    let trigger = runner.trigger();
    let mut definition = AgentDefinition::new(AgentId::new(trigger.name())?, trigger.name())
        .with_description(trigger.description());
    for pattern in trigger.bound_event_types() {
        definition = definition.bound_to(pattern);
    }

    let id = registry.register_agent_with_timeout(
        definition,
        move |event: &EventEnvelope| match runner.handle(event) {
            Ok(_) | Err(TriggerError::ParentNotFound { .. }) => Ok(()),
            Err(err) => Err(AgentError::new(err.to_string())),
        },
        timeout,
    )?;
    Ok(id)
}
