//! One bus, one agent registry, one rule engine: the operator-facing facade.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use ripple_core::{AgentId, RuleId};
use ripple_events::{
    BusConfig, BusConfigError, EmissionError, EmitReceipt, EventBus, EventEnvelope, EventMeta, EventPayload,
};

use crate::action::ActionExecutor;
use crate::agent::{AgentRegistry, AgentRegistryConfig, AgentSnapshot, RegistryError};
use crate::rules::{PropagationRule, RuleEngine, RuleError, RuleSnapshot};
use crate::stats::StatsSnapshot;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub bus: BusConfig,
    pub agents: AgentRegistryConfig,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] BusConfigError),

    #[error(transparent)]
    Emission(#[from] EmissionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Rule(#[from] RuleError),
}

#[derive(Debug)]
pub struct AutomationEngine {
    bus: EventBus,
    agents: AgentRegistry,
    rules: RuleEngine,
}

impl AutomationEngine {
    pub fn new(config: AutomationConfig, executor: Arc<dyn ActionExecutor>) -> Result<Self, EngineError> {
        let bus = EventBus::new(config.bus.clone())?;
        let agents = AgentRegistry::new(bus.clone(), config.agents.clone());
        let rules = RuleEngine::attach_with_timeout(&bus, executor, config.agents.default_timeout());
        info!(
            capacity = config.bus.capacity,
            max_hops = config.bus.max_hops,
            default_timeout_ms = config.agents.default_timeout_ms,
            "automation engine started"
        );
        Ok(Self { bus, agents, rules })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn emit(&self, payload: EventPayload, meta: EventMeta) -> Result<EmitReceipt, EmissionError> {
        self.bus.emit(payload, meta)
    }

    pub fn emit_raw(&self, event_type: &str, data: JsonValue, meta: EventMeta) -> Result<EmitReceipt, EmissionError> {
        self.bus.emit_raw(event_type, data, meta)
    }

    pub fn recent_events(&self, limit: usize) -> Vec<Arc<EventEnvelope>> {
        self.bus.recent_events(limit)
    }

    pub fn list_agents(&self) -> Vec<AgentSnapshot> {
        self.agents.list_agents()
    }

    pub fn enable_agent(&self, id: &AgentId) -> Result<(), EngineError> {
        Ok(self.agents.enable_agent(id)?)
    }

    pub fn disable_agent(&self, id: &AgentId) -> Result<(), EngineError> {
        Ok(self.agents.disable_agent(id)?)
    }

    pub fn add_rule(&self, rule: PropagationRule) -> Result<(), EngineError> {
        Ok(self.rules.add_rule(rule)?)
    }

    pub fn list_rules(&self) -> Vec<RuleSnapshot> {
        self.rules.list_rules()
    }

    pub fn enable_rule(&self, id: &RuleId) -> Result<(), EngineError> {
        Ok(self.rules.enable_rule(id)?)
    }

    pub fn disable_rule(&self, id: &RuleId) -> Result<(), EngineError> {
        Ok(self.rules.disable_rule(id)?)
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot::collect(&self.bus, &self.agents, &self.rules)
    }

    /// Detach rules, drop agents, then shut the bus. Later emits fail with
    /// [`EmissionError::Disposed`].
    pub fn dispose(&self) {
        self.rules.detach();
        self.agents.dispose();
        self.bus.dispose();
        info!("automation engine disposed");
    }
}
