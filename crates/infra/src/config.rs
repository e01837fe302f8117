//! Engine configuration: serde defaults overlaid with `RIPPLE_*` env vars.
//!
//! | variable                       | field                          | default        |
//! |--------------------------------|--------------------------------|----------------|
//! | `RIPPLE_BUS_CAPACITY`          | `bus.capacity`                 | 100            |
//! | `RIPPLE_MAX_HOPS`              | `bus.max_hops`                 | 5              |
//! | `RIPPLE_AGENT_TIMEOUT_MS`      | `agents.default_timeout_ms`    | 5000 (0 = off) |
//! | `RIPPLE_TRIGGER_MAX_ATTEMPTS`  | `triggers.retry.max_attempts`  | 3              |
//! | `RIPPLE_TRIGGER_BASE_DELAY_MS` | `triggers.retry.base_delay_ms` | 10             |
//! | `RIPPLE_BIND_ADDR`             | `api.bind_addr`                | 0.0.0.0:8080   |

use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ripple_automation::{AgentRegistryConfig, AutomationConfig};
use ripple_events::BusConfig;

use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidVar {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("malformed configuration document: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bus: BusConfig,
    pub agents: AgentRegistryConfig,
    pub triggers: TriggerConfig,
    pub api: ApiConfig,
}

impl EngineConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RIPPLE_*` values from `lookup` on top of `self`.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "RIPPLE_BUS_CAPACITY")? {
            self.bus.capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "RIPPLE_MAX_HOPS")? {
            self.bus.max_hops = v;
        }
        if let Some(v) = parse_var(&lookup, "RIPPLE_AGENT_TIMEOUT_MS")? {
            self.agents.default_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "RIPPLE_TRIGGER_MAX_ATTEMPTS")? {
            self.triggers.retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "RIPPLE_TRIGGER_BASE_DELAY_MS")? {
            self.triggers.retry.base_delay_ms = v;
        }
        if let Some(v) = lookup("RIPPLE_BIND_ADDR") {
            self.api.bind_addr = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_agents(mut self, agents: AgentRegistryConfig) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.triggers.retry = retry;
        self
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.api.bind_addr = addr.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bus
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.triggers.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "triggers.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.api.bind_addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidVar {
            key: "RIPPLE_BIND_ADDR",
            value: self.api.bind_addr.clone(),
            reason: e.to_string(),
        })
    }

    pub fn automation(&self) -> AutomationConfig {
        AutomationConfig {
            bus: self.bus.clone(),
            agents: self.agents.clone(),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::InvalidVar {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.bus.capacity, 100);
        assert_eq!(config.bus.max_hops, 5);
        assert_eq!(config.agents.default_timeout_ms, 5_000);
        assert_eq!(config.triggers.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = EngineConfig::default()
            .overlay(env(&[
                ("RIPPLE_BUS_CAPACITY", "250"),
                ("RIPPLE_MAX_HOPS", "3"),
                ("RIPPLE_AGENT_TIMEOUT_MS", "0"),
                ("RIPPLE_TRIGGER_MAX_ATTEMPTS", "5"),
                ("RIPPLE_BIND_ADDR", "127.0.0.1:9000"),
            ]))
            .unwrap();

        assert_eq!(config.bus.capacity, 250);
        assert_eq!(config.bus.max_hops, 3);
        assert_eq!(config.agents.default_timeout(), None);
        assert_eq!(config.triggers.retry.max_attempts, 5);
        assert_eq!(config.bind_addr().unwrap().port(), 9000);
    }

    #[test]
    fn malformed_env_value_is_rejected() {
        let err = EngineConfig::default()
            .overlay(env(&[("RIPPLE_BUS_CAPACITY", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { key: "RIPPLE_BUS_CAPACITY", .. }));
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let err = EngineConfig::default()
            .overlay(env(&[("RIPPLE_BUS_CAPACITY", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unbounded_hop_limit_is_invalid() {
        let err = EngineConfig::default()
            .overlay(env(&[("RIPPLE_MAX_HOPS", "255")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn json_document_fills_missing_fields() {
        let config = EngineConfig::from_json_str(r#"{ "bus": { "capacity": 10 }, "triggers": { "retry": { "max_attempts": 2 } } }"#)
            .unwrap();
        assert_eq!(config.bus.capacity, 10);
        assert_eq!(config.bus.max_hops, 5);
        assert_eq!(config.triggers.retry.max_attempts, 2);
        assert_eq!(config.api.bind_addr, "0.0.0.0:8080");
    }
}
