//! Agents, propagation rules and the engine facade built on `ripple-events`.

pub mod action;
pub mod agent;
pub mod engine;
pub mod execution;
pub mod rules;
pub mod stats;

pub use action::{ActionDescriptor, ActionError, ActionExecutor, ActionOutcome, ActionRouter};
pub use agent::{
    AgentAction, AgentDefinition, AgentError, AgentRegistry, AgentRegistryConfig, AgentSnapshot, RegistryError,
};
pub use engine::{AutomationConfig, AutomationEngine, EngineError};
pub use execution::ExecutionError;
pub use rules::{PropagationRule, RuleEngine, RuleError, RuleSnapshot};
pub use stats::StatsSnapshot;
