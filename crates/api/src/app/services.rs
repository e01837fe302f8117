//! Runtime wiring: engine, in-memory store, consistency triggers and the
//! project service that writes through them.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use ripple_automation::{
    ActionDescriptor, ActionError, ActionOutcome, ActionRouter, AutomationEngine, EngineError, PropagationRule,
};
use ripple_events::{EventEnvelope, EventPayload};
use ripple_infra::{
    BudgetTrigger, ConfigError, EngineConfig, InMemoryDocumentStore, ProgressTrigger, ProjectService,
    RegisterTriggerError, TriggerRunner, register_trigger,
};

#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Trigger(#[from] RegisterTriggerError),

    #[error("cannot read rules file {path}: {source}")]
    RulesFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed rules file {path}: {source}")]
    RulesFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AppServices {
    pub engine: Arc<AutomationEngine>,
    pub store: Arc<InMemoryDocumentStore>,
    pub projects: ProjectService,
}

/// Build the engine with both triggers registered and, when given, the
/// propagation rules from a JSON file (an array of rules).
pub fn build_services(config: &EngineConfig, rules_file: Option<&str>) -> Result<AppServices, BootError> {
    config.validate()?;

    let engine = Arc::new(AutomationEngine::new(config.automation(), Arc::new(action_router()))?);
    let store = Arc::new(InMemoryDocumentStore::new());
    let timeout = config.agents.default_timeout();
    let retry = config.triggers.retry.clone();

    let budget = TriggerRunner::new(BudgetTrigger, store.clone()).with_retry(retry.clone());
    register_trigger(engine.agents(), Arc::new(budget), timeout)?;
    let progress = TriggerRunner::new(ProgressTrigger, store.clone()).with_retry(retry);
    register_trigger(engine.agents(), Arc::new(progress), timeout)?;

    if let Some(path) = rules_file {
        for rule in load_rules(path)? {
            engine.add_rule(rule)?;
        }
    }

    let projects = ProjectService::new(store.clone(), engine.bus().clone());
    info!(
        agents = engine.agents().len(),
        rules = engine.rules().len(),
        "services ready"
    );
    Ok(AppServices { engine, store, projects })
}

fn load_rules(path: &str) -> Result<Vec<PropagationRule>, BootError> {
    let raw = std::fs::read_to_string(path).map_err(|source| BootError::RulesFile {
        path: path.to_string(),
        source,
    })?;
    parse_rules(&raw).map_err(|source| BootError::RulesFormat {
        path: path.to_string(),
        source,
    })
}

pub(crate) fn parse_rules(raw: &str) -> Result<Vec<PropagationRule>, serde_json::Error> {
    serde_json::from_str(raw)
}

#[derive(Debug, Deserialize)]
struct EmitParams {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: JsonValue,
}

/// Built-in action kinds.
///
/// - `log` / `log.*`: record the triggering event.
/// - `emit`: emit `{ "type", "data" }` from the params one hop deeper.
pub fn action_router() -> ActionRouter {
    let mut router = ActionRouter::new();
    router.register_fn("log", log_action);
    router.register_fn("log.*", log_action);
    router.register_fn("emit", |action: &ActionDescriptor, _: &EventEnvelope| {
        let params: EmitParams = serde_json::from_value(action.params.clone())
            .map_err(|e| ActionError::failed(&action.kind, e.to_string()))?;
        let payload = EventPayload::from_raw(&params.event_type, params.data)
            .map_err(|e| ActionError::failed(&action.kind, e.to_string()))?;
        Ok(ActionOutcome::done().with_follow_up(payload))
    });
    router
}

fn log_action(action: &ActionDescriptor, event: &EventEnvelope) -> Result<ActionOutcome, ActionError> {
    info!(
        action_kind = %action.kind,
        event_id = %event.id(),
        event_type = event.event_type(),
        params = %action.params,
        "rule action"
    );
    Ok(ActionOutcome::done())
}
