//! Action descriptors and the executor boundary.
//!
//! Propagation rules are data: each rule carries an ordered list of
//! [`ActionDescriptor`]s. The concrete behaviour (send a notification,
//! revalidate a cached view, call an external service) lives in the consuming
//! modules, which plug in through [`ActionExecutor`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use ripple_events::{EventEnvelope, EventPayload};

/// One step of a propagation rule (e.g. `{"kind": "notify.email", "params": {...}}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub kind: String,
    #[serde(default)]
    pub params: JsonValue,
}

impl ActionDescriptor {
    pub fn new(kind: impl Into<String>, params: JsonValue) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// What an action asks the engine to do afterwards.
///
/// Actions never call other rules directly. Anything cascading is returned
/// here and emitted as a new event one hop deeper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub follow_ups: Vec<EventPayload>,
}

impl ActionOutcome {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn with_follow_up(mut self, payload: EventPayload) -> Self {
        self.follow_ups.push(payload);
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("no executor registered for action kind '{0}'")]
    NoExecutor(String),

    #[error("action '{kind}' failed: {message}")]
    Failed { kind: String, message: String },
}

impl ActionError {
    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Executes action descriptors with the triggering event as context.
pub trait ActionExecutor: Send + Sync {
    fn execute(
        &self,
        action: &ActionDescriptor,
        event: &EventEnvelope,
    ) -> Result<ActionOutcome, ActionError>;
}

impl<F> ActionExecutor for F
where
    F: Fn(&ActionDescriptor, &EventEnvelope) -> Result<ActionOutcome, ActionError> + Send + Sync,
{
    fn execute(
        &self,
        action: &ActionDescriptor,
        event: &EventEnvelope,
    ) -> Result<ActionOutcome, ActionError> {
        self(action, event)
    }
}

/// Routes actions to per-kind executors.
///
/// Resolution order: exact kind, then the longest matching category pattern
/// (`"notify.*"` matches `"notify.email"`), then `"*"`.
#[derive(Default)]
pub struct ActionRouter {
    executors: HashMap<String, Arc<dyn ActionExecutor>>,
}

impl core::fmt::Debug for ActionRouter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut kinds: Vec<&String> = self.executors.keys().collect();
        kinds.sort();
        f.debug_struct("ActionRouter").field("kinds", &kinds).finish()
    }
}

impl ActionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind_pattern: impl Into<String>, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(kind_pattern.into(), executor);
    }

    pub fn register_fn<F>(&mut self, kind_pattern: impl Into<String>, executor: F)
    where
        F: Fn(&ActionDescriptor, &EventEnvelope) -> Result<ActionOutcome, ActionError>
            + Send
            + Sync
            + 'static,
    {
        self.executors.insert(kind_pattern.into(), Arc::new(executor));
    }

    fn resolve(&self, kind: &str) -> Option<&Arc<dyn ActionExecutor>> {
        if let Some(exec) = self.executors.get(kind) {
            return Some(exec);
        }

        let category = self
            .executors
            .iter()
            .filter_map(|(pattern, exec)| {
                let prefix = pattern.strip_suffix(".*")?;
                let rest = kind.strip_prefix(prefix)?;
                rest.starts_with('.').then_some((prefix.len(), exec))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, exec)| exec);
        if category.is_some() {
            return category;
        }

        self.executors.get("*")
    }
}

impl ActionExecutor for ActionRouter {
    fn execute(
        &self,
        action: &ActionDescriptor,
        event: &EventEnvelope,
    ) -> Result<ActionOutcome, ActionError> {
        let executor = self
            .resolve(&action.kind)
            .ok_or_else(|| ActionError::NoExecutor(action.kind.clone()))?;
        executor.execute(action, event)
    }
}
