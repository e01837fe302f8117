//! Agent registry: named, toggleable automation units bound to event types.
//!
//! Each bound pattern gets one dispatcher subscription on the bus. Toggling an
//! agent never touches those subscriptions: a disabled agent short-circuits at
//! dispatch (counted as skipped), so there is no unsubscribe/resubscribe race
//! with emits already in flight.
//!
//! Agent failures (error, panic, timeout) are caught at the dispatch boundary,
//! logged with `{agent_id, event_id}` and counted. They never disable the agent
//! and never reach the bus or sibling handlers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use ripple_core::AgentId;
use ripple_events::{EventBus, EventEnvelope, HandlerError, SubscriptionHandle, SubscriptionPattern};

use crate::execution::{ExecutionError, run_inline, run_with_timeout};

/// Failure reported by an agent body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct AgentError(String);

impl AgentError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("agent '{0}' is already registered")]
    DuplicateAgent(AgentId),

    #[error("agent '{0}' is not registered")]
    UnknownAgent(AgentId),

    #[error("agent '{0}' is not bound to any event type")]
    NoBoundEventTypes(AgentId),

    #[error("agent registry state poisoned")]
    Poisoned,
}

/// The side effect an agent performs for each matching event.
pub trait AgentAction: Send + Sync + 'static {
    fn run(&self, envelope: &EventEnvelope) -> Result<(), AgentError>;
}

impl<F> AgentAction for F
where
    F: Fn(&EventEnvelope) -> Result<(), AgentError> + Send + Sync + 'static,
{
    fn run(&self, envelope: &EventEnvelope) -> Result<(), AgentError> {
        self(envelope)
    }
}

/// Static declaration of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub bound_event_types: Vec<SubscriptionPattern>,
}

impl AgentDefinition {
    pub fn new(id: AgentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            bound_event_types: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn bound_to(mut self, pattern: SubscriptionPattern) -> Self {
        self.bound_event_types.push(pattern);
        self
    }
}

/// Point-in-time view of an agent for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub name: String,
    pub description: String,
    pub bound_event_types: Vec<SubscriptionPattern>,
    pub enabled: bool,
    /// Invocations of the agent body (successful or not).
    pub execution_count: u64,
    /// Dispatches skipped because the agent was disabled.
    pub skipped_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentRegistryConfig {
    /// Per-execution timeout applied when an agent does not set its own.
    /// `0` runs agents inline without a timeout.
    pub default_timeout_ms: u64,
}

impl Default for AgentRegistryConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5_000,
        }
    }
}

impl AgentRegistryConfig {
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
        self
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_ms > 0).then(|| Duration::from_millis(self.default_timeout_ms))
    }
}

#[derive(Debug)]
struct AgentState {
    enabled: AtomicBool,
    execution_count: AtomicU64,
    skipped_count: AtomicU64,
    failure_count: AtomicU64,
    timeout_count: AtomicU64,
    last_run_at: Mutex<Option<DateTime<Utc>>>,
    timeout: Option<Duration>,
}

impl AgentState {
    fn new(timeout: Option<Duration>) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            execution_count: AtomicU64::new(0),
            skipped_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
            last_run_at: Mutex::new(None),
            timeout,
        }
    }
}

struct AgentEntry {
    definition: AgentDefinition,
    state: Arc<AgentState>,
    subscriptions: Vec<SubscriptionHandle>,
}

impl AgentEntry {
    fn snapshot(&self) -> AgentSnapshot {
        let s = &self.state;
        AgentSnapshot {
            id: self.definition.id.clone(),
            name: self.definition.name.clone(),
            description: self.definition.description.clone(),
            bound_event_types: self.definition.bound_event_types.clone(),
            enabled: s.enabled.load(Ordering::Acquire),
            execution_count: s.execution_count.load(Ordering::Relaxed),
            skipped_count: s.skipped_count.load(Ordering::Relaxed),
            failure_count: s.failure_count.load(Ordering::Relaxed),
            timeout_count: s.timeout_count.load(Ordering::Relaxed),
            last_run_at: s.last_run_at.lock().map(|t| *t).unwrap_or(None),
        }
    }
}

/// Registry of agents attached to one bus.
pub struct AgentRegistry {
    bus: EventBus,
    config: AgentRegistryConfig,
    agents: RwLock<Vec<AgentEntry>>,
}

impl core::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("config", &self.config)
            .field("agents", &self.len())
            .finish()
    }
}

impl AgentRegistry {
    pub fn new(bus: EventBus, config: AgentRegistryConfig) -> Self {
        Self {
            bus,
            config,
            agents: RwLock::new(Vec::new()),
        }
    }

    /// Register an agent whose body is a closure, using the default timeout.
    pub fn register_agent<F>(&self, definition: AgentDefinition, action: F) -> Result<AgentId, RegistryError>
    where
        F: Fn(&EventEnvelope) -> Result<(), AgentError> + Send + Sync + 'static,
    {
        let timeout = self.config.default_timeout();
        self.register_agent_action(definition, Arc::new(action), timeout)
    }

    /// Register an agent with an explicit timeout (`None` runs inline).
    pub fn register_agent_with_timeout<F>(
        &self,
        definition: AgentDefinition,
        action: F,
        timeout: Option<Duration>,
    ) -> Result<AgentId, RegistryError>
    where
        F: Fn(&EventEnvelope) -> Result<(), AgentError> + Send + Sync + 'static,
    {
        self.register_agent_action(definition, Arc::new(action), timeout)
    }

    /// Register a shared agent body.
    pub fn register_agent_action(
        &self,
        definition: AgentDefinition,
        action: Arc<dyn AgentAction>,
        timeout: Option<Duration>,
    ) -> Result<AgentId, RegistryError> {
        let id = definition.id.clone();
        if definition.bound_event_types.is_empty() {
            return Err(RegistryError::NoBoundEventTypes(id));
        }

        let mut agents = self.agents.write().map_err(|_| RegistryError::Poisoned)?;
        if agents.iter().any(|a| a.definition.id == id) {
            return Err(RegistryError::DuplicateAgent(id));
        }

        let state = Arc::new(AgentState::new(timeout));
        let subscriptions = definition
            .bound_event_types
            .iter()
            .map(|pattern| {
                let dispatcher = dispatcher(id.clone(), state.clone(), action.clone());
                self.bus
                    .subscribe_named(format!("agent:{id}"), pattern.clone(), dispatcher)
            })
            .collect();

        info!(
            agent_id = %id,
            bound = ?definition.bound_event_types.iter().map(ToString::to_string).collect::<Vec<_>>(),
            timeout_ms = ?timeout.map(|t| t.as_millis()),
            "agent registered"
        );

        agents.push(AgentEntry {
            definition,
            state,
            subscriptions,
        });

        Ok(id)
    }

    pub fn enable_agent(&self, id: &AgentId) -> Result<(), RegistryError> {
        self.set_enabled(id, true)
    }

    pub fn disable_agent(&self, id: &AgentId) -> Result<(), RegistryError> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &AgentId, enabled: bool) -> Result<(), RegistryError> {
        let agents = self.agents.read().map_err(|_| RegistryError::Poisoned)?;
        let entry = agents
            .iter()
            .find(|a| &a.definition.id == id)
            .ok_or_else(|| RegistryError::UnknownAgent(id.clone()))?;

        let previous = entry.state.enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            info!(agent_id = %id, enabled, "agent toggled");
        }
        Ok(())
    }

    /// Snapshots in registration order.
    pub fn list_agents(&self) -> Vec<AgentSnapshot> {
        match self.agents.read() {
            Ok(agents) => agents.iter().map(AgentEntry::snapshot).collect(),
            Err(_) => vec![],
        }
    }

    pub fn get_agent(&self, id: &AgentId) -> Option<AgentSnapshot> {
        let agents = self.agents.read().ok()?;
        agents
            .iter()
            .find(|a| &a.definition.id == id)
            .map(AgentEntry::snapshot)
    }

    /// Remove an agent and its bus subscriptions.
    pub fn unregister_agent(&self, id: &AgentId) -> Result<(), RegistryError> {
        let mut agents = self.agents.write().map_err(|_| RegistryError::Poisoned)?;
        let pos = agents
            .iter()
            .position(|a| &a.definition.id == id)
            .ok_or_else(|| RegistryError::UnknownAgent(id.clone()))?;

        let entry = agents.remove(pos);
        for sub in &entry.subscriptions {
            sub.unsubscribe();
        }
        info!(agent_id = %id, "agent unregistered");
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        match self.agents.read() {
            Ok(agents) => agents
                .iter()
                .filter(|a| a.state.enabled.load(Ordering::Acquire))
                .count(),
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.agents.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unsubscribe every agent and clear the registry.
    pub fn dispose(&self) {
        if let Ok(mut agents) = self.agents.write() {
            for entry in agents.drain(..) {
                for sub in &entry.subscriptions {
                    sub.unsubscribe();
                }
            }
        }
    }
}

fn dispatcher(
    agent_id: AgentId,
    state: Arc<AgentState>,
    action: Arc<dyn AgentAction>,
) -> impl Fn(&EventEnvelope) -> Result<(), HandlerError> + Send + Sync + 'static {
    move |envelope: &EventEnvelope| {
        if !state.enabled.load(Ordering::Acquire) {
            state.skipped_count.fetch_add(1, Ordering::Relaxed);
            debug!(agent_id = %agent_id, event_id = %envelope.id(), "agent disabled; skipping");
            return Ok(());
        }

        state.execution_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = state.last_run_at.lock() {
            *last = Some(Utc::now());
        }

        let result = match state.timeout {
            None => run_inline(|| action.run(envelope).map_err(|e| e.to_string())),
            Some(timeout) => {
                let action = action.clone();
                let owned = envelope.clone();
                run_with_timeout(&format!("agent-{agent_id}"), timeout, move || {
                    action.run(&owned).map_err(|e| e.to_string())
                })
            }
        };

        match result {
            Ok(()) => {}
            Err(ExecutionError::TimedOut(after)) => {
                state.failure_count.fetch_add(1, Ordering::Relaxed);
                state.timeout_count.fetch_add(1, Ordering::Relaxed);
                warn!(
                    agent_id = %agent_id,
                    event_id = %envelope.id(),
                    timeout_ms = after.as_millis() as u64,
                    "agent execution timed out"
                );
            }
            Err(err) => {
                state.failure_count.fetch_add(1, Ordering::Relaxed);
                warn!(
                    agent_id = %agent_id,
                    event_id = %envelope.id(),
                    error = %err,
                    "agent execution failed"
                );
            }
        }

        // Failures stop here; the bus never sees them.
        Ok(())
    }
}
