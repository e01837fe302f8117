//! Propagation rule engine: declarative event-type → actions mappings.
//!
//! ## Matching
//!
//! The engine holds a single `"*"` subscription. For every event it walks the
//! rule table once (O(rules), fine at tens of rules) and runs each enabled
//! rule whose trigger matches, in rule insertion order.
//!
//! ## Execution
//!
//! - Actions of one rule run in order through the injected [`ActionExecutor`]
//! - A failing action stops the rest of *that* rule; other rules still run
//! - With an action timeout each action runs on a worker thread and a slow
//!   one counts as a failure once the timeout passes
//! - Failures are logged with `{rule_id, event_id, action_kind}` and counted
//!
//! ## No chaining
//!
//! A rule never invokes another rule within a dispatch pass. Follow-up events
//! returned by actions are emitted only after every matching rule ran, through
//! `emit_caused_by`, so they are one hop deeper and subject to the bus's hop
//! limit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use ripple_core::RuleId;
use ripple_events::{EventBus, EventEnvelope, EventPayload, SubscriptionHandle, SubscriptionPattern, WeakEventBus};

use crate::action::{ActionDescriptor, ActionExecutor, ActionOutcome};
use crate::execution::{ExecutionError, run_inline, run_with_timeout};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule '{0}' already exists")]
    DuplicateRule(RuleId),

    #[error("rule '{0}' does not exist")]
    UnknownRule(RuleId),

    #[error("rule table poisoned")]
    Poisoned,
}

fn enabled_by_default() -> bool {
    true
}

/// Declarative mapping from an event type to downstream actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationRule {
    pub id: RuleId,
    pub name: String,
    pub trigger_type: SubscriptionPattern,
    pub actions: Vec<ActionDescriptor>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl PropagationRule {
    pub fn new(id: RuleId, name: impl Into<String>, trigger_type: SubscriptionPattern) -> Self {
        Self {
            id,
            name: name.into(),
            trigger_type,
            actions: Vec::new(),
            enabled: true,
        }
    }

    pub fn then(mut self, action: ActionDescriptor) -> Self {
        self.actions.push(action);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Operator view of a rule and its counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSnapshot {
    #[serde(flatten)]
    pub rule: PropagationRule,
    pub fired_count: u64,
    pub failure_count: u64,
}

#[derive(Debug, Default)]
struct RuleCounters {
    fired: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug)]
struct RuleEntry {
    rule: PropagationRule,
    counters: Arc<RuleCounters>,
}

impl RuleEntry {
    fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            rule: self.rule.clone(),
            fired_count: self.counters.fired.load(Ordering::Relaxed),
            failure_count: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

struct RuleTable {
    rules: RwLock<Vec<RuleEntry>>,
    executor: Arc<dyn ActionExecutor>,
    action_timeout: Option<Duration>,
}

impl RuleTable {
    fn run_action(&self, action: &ActionDescriptor, envelope: &EventEnvelope) -> Result<ActionOutcome, ExecutionError> {
        match self.action_timeout {
            None => run_inline(|| self.executor.execute(action, envelope).map_err(|e| e.to_string())),
            Some(timeout) => {
                let executor = self.executor.clone();
                let owned_action = action.clone();
                let owned_event = envelope.clone();
                run_with_timeout(&format!("rule-action-{}", action.kind), timeout, move || {
                    executor
                        .execute(&owned_action, &owned_event)
                        .map_err(|e| e.to_string())
                })
            }
        }
    }

    fn on_event(&self, bus: &WeakEventBus, envelope: &EventEnvelope) {
        let matching: Vec<(PropagationRule, Arc<RuleCounters>)> = match self.rules.read() {
            Ok(rules) => rules
                .iter()
                .filter(|e| e.rule.enabled && e.rule.trigger_type.matches(envelope.event_type()))
                .map(|e| (e.rule.clone(), e.counters.clone()))
                .collect(),
            Err(_) => {
                error!(event_id = %envelope.id(), "rule table poisoned; skipping rules");
                return;
            }
        };

        if matching.is_empty() {
            return;
        }

        let mut follow_ups: Vec<(RuleId, EventPayload)> = Vec::new();

        for (rule, counters) in matching {
            counters.fired.fetch_add(1, Ordering::Relaxed);
            debug!(rule_id = %rule.id, event_id = %envelope.id(), "rule fired");

            for action in &rule.actions {
                match self.run_action(action, envelope) {
                    Ok(outcome) => {
                        follow_ups.extend(outcome.follow_ups.into_iter().map(|p| (rule.id.clone(), p)));
                    }
                    Err(ExecutionError::TimedOut(after)) => {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            rule_id = %rule.id,
                            event_id = %envelope.id(),
                            action_kind = %action.kind,
                            timeout_ms = after.as_millis() as u64,
                            "propagation action timed out; skipping remaining actions of rule"
                        );
                        break;
                    }
                    Err(ExecutionError::Panicked(panic)) => {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        error!(
                            rule_id = %rule.id,
                            event_id = %envelope.id(),
                            action_kind = %action.kind,
                            panic = %panic,
                            "propagation action panicked; skipping remaining actions of rule"
                        );
                        break;
                    }
                    Err(err) => {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            rule_id = %rule.id,
                            event_id = %envelope.id(),
                            action_kind = %action.kind,
                            error = %err,
                            "propagation action failed; skipping remaining actions of rule"
                        );
                        break;
                    }
                }
            }
        }

        if follow_ups.is_empty() {
            return;
        }
        let Some(bus) = bus.upgrade() else {
            return;
        };
        for (rule_id, payload) in follow_ups {
            let event_type = payload.event_type().to_string();
            if let Err(err) = bus.emit_caused_by(envelope, payload, format!("rule:{rule_id}")) {
                warn!(
                    rule_id = %rule_id,
                    event_id = %envelope.id(),
                    follow_up_type = %event_type,
                    error = %err,
                    "follow-up event rejected"
                );
            }
        }
    }
}

/// Rule engine attached to one bus.
pub struct RuleEngine {
    table: Arc<RuleTable>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

impl core::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.len())
            .finish_non_exhaustive()
    }
}

impl RuleEngine {
    /// Create an engine and subscribe it to every event on `bus`. Actions run
    /// inline without a timeout.
    pub fn attach(bus: &EventBus, executor: Arc<dyn ActionExecutor>) -> Self {
        Self::attach_with_timeout(bus, executor, None)
    }

    /// Like [`RuleEngine::attach`], but each action may take at most
    /// `action_timeout` before it counts as a failed action.
    pub fn attach_with_timeout(
        bus: &EventBus,
        executor: Arc<dyn ActionExecutor>,
        action_timeout: Option<Duration>,
    ) -> Self {
        let table = Arc::new(RuleTable {
            rules: RwLock::new(Vec::new()),
            executor,
            action_timeout,
        });

        let weak_bus = bus.downgrade();
        let handler_table = table.clone();
        let subscription = bus.subscribe_named(
            "rule-engine",
            SubscriptionPattern::All,
            move |envelope: &EventEnvelope| {
                handler_table.on_event(&weak_bus, envelope);
                Ok(())
            },
        );

        Self {
            table,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    pub fn add_rule(&self, rule: PropagationRule) -> Result<(), RuleError> {
        let mut rules = self.table.rules.write().map_err(|_| RuleError::Poisoned)?;
        if rules.iter().any(|e| e.rule.id == rule.id) {
            return Err(RuleError::DuplicateRule(rule.id));
        }
        info!(rule_id = %rule.id, trigger = %rule.trigger_type, actions = rule.actions.len(), "rule added");
        rules.push(RuleEntry {
            rule,
            counters: Arc::new(RuleCounters::default()),
        });
        Ok(())
    }

    pub fn remove_rule(&self, id: &RuleId) -> Result<PropagationRule, RuleError> {
        let mut rules = self.table.rules.write().map_err(|_| RuleError::Poisoned)?;
        let pos = rules
            .iter()
            .position(|e| &e.rule.id == id)
            .ok_or_else(|| RuleError::UnknownRule(id.clone()))?;
        info!(rule_id = %id, "rule removed");
        Ok(rules.remove(pos).rule)
    }

    pub fn enable_rule(&self, id: &RuleId) -> Result<(), RuleError> {
        self.set_enabled(id, true)
    }

    pub fn disable_rule(&self, id: &RuleId) -> Result<(), RuleError> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &RuleId, enabled: bool) -> Result<(), RuleError> {
        let mut rules = self.table.rules.write().map_err(|_| RuleError::Poisoned)?;
        let entry = rules
            .iter_mut()
            .find(|e| &e.rule.id == id)
            .ok_or_else(|| RuleError::UnknownRule(id.clone()))?;
        if entry.rule.enabled != enabled {
            entry.rule.enabled = enabled;
            info!(rule_id = %id, enabled, "rule toggled");
        }
        Ok(())
    }

    pub fn list_rules(&self) -> Vec<RuleSnapshot> {
        match self.table.rules.read() {
            Ok(rules) => rules.iter().map(RuleEntry::snapshot).collect(),
            Err(_) => vec![],
        }
    }

    pub fn get_rule(&self, id: &RuleId) -> Option<RuleSnapshot> {
        let rules = self.table.rules.read().ok()?;
        rules.iter().find(|e| &e.rule.id == id).map(RuleEntry::snapshot)
    }

    pub fn active_count(&self) -> usize {
        match self.table.rules.read() {
            Ok(rules) => rules.iter().filter(|e| e.rule.enabled).count(),
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.table.rules.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop receiving events. Rules stay listed.
    pub fn detach(&self) {
        if let Ok(mut sub) = self.subscription.lock() {
            if let Some(handle) = sub.take() {
                handle.unsubscribe();
            }
        }
    }
}
