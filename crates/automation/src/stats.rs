//! Point-in-time counters for operators.

use serde::Serialize;

use ripple_events::EventBus;

use crate::agent::AgentRegistry;
use crate::rules::RuleEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub active_agents: usize,
    pub total_agents: usize,
    /// Accepted emits since start; not capped by the history buffer.
    pub total_events: u64,
    /// Enabled propagation rules.
    pub propagation_rules: usize,
    pub total_rules: usize,
    pub recent_buffer_len: usize,
    pub subscribers: usize,
}

impl StatsSnapshot {
    pub fn collect(bus: &EventBus, agents: &AgentRegistry, rules: &RuleEngine) -> Self {
        Self {
            active_agents: agents.active_count(),
            total_agents: agents.len(),
            total_events: bus.total_emitted(),
            propagation_rules: rules.active_count(),
            total_rules: rules.len(),
            recent_buffer_len: bus.history_len(),
            subscribers: bus.subscriber_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionRouter;
    use crate::agent::{AgentDefinition, AgentError, AgentRegistryConfig};
    use crate::rules::PropagationRule;
    use ripple_core::{AgentId, RuleId};
    use ripple_events::{BusConfig, EventMeta, EventPayload, SubscriptionPattern};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn counts_reflect_toggles_and_uncapped_event_total() {
        let bus = EventBus::new(BusConfig::default().with_capacity(3)).unwrap();
        let agents = AgentRegistry::new(bus.clone(), AgentRegistryConfig::default().with_default_timeout(None));
        let rules = RuleEngine::attach(&bus, Arc::new(ActionRouter::new()));

        for name in ["a", "b"] {
            agents
                .register_agent(
                    AgentDefinition::new(AgentId::new(name).unwrap(), name).bound_to(SubscriptionPattern::All),
                    |_| Ok::<_, AgentError>(()),
                )
                .unwrap();
        }
        agents.disable_agent(&AgentId::new("b").unwrap()).unwrap();
        rules
            .add_rule(PropagationRule::new(RuleId::new("r1").unwrap(), "r1", SubscriptionPattern::All))
            .unwrap();
        rules
            .add_rule(PropagationRule::new(RuleId::new("r2").unwrap(), "r2", SubscriptionPattern::All).disabled())
            .unwrap();

        for _ in 0..5 {
            bus.emit(EventPayload::custom("x:y", json!({})), EventMeta::default()).unwrap();
        }

        let stats = StatsSnapshot::collect(&bus, &agents, &rules);
        assert_eq!(
            stats,
            StatsSnapshot {
                active_agents: 1,
                total_agents: 2,
                total_events: 5,
                propagation_rules: 1,
                total_rules: 2,
                recent_buffer_len: 3,
                subscribers: 3,
            }
        );
    }
}
