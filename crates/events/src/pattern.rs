//! Subscription patterns: exact type, namespace wildcard, global wildcard.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EmissionError;
use crate::payload::validate_event_type;

/// Which event types a subscription receives.
///
/// - `"*"` receives every event
/// - `"invoice:*"` receives every event in the `invoice` namespace
/// - anything else must match the event type exactly
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SubscriptionPattern {
    All,
    Namespace(String),
    Exact(String),
}

impl SubscriptionPattern {
    pub fn exact(event_type: impl Into<String>) -> Self {
        Self::Exact(event_type.into())
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(t) => t == event_type,
            Self::Namespace(ns) => event_type
                .strip_prefix(ns.as_str())
                .is_some_and(|rest| rest.starts_with(':')),
        }
    }
}

impl FromStr for SubscriptionPattern {
    type Err = EmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Self::All);
        }
        match s.strip_suffix(":*") {
            Some(ns) => {
                validate_event_type(ns).map_err(|_| EmissionError::InvalidType(s.to_string()))?;
                Ok(Self::Namespace(ns.to_string()))
            }
            None => {
                validate_event_type(s)?;
                Ok(Self::Exact(s.to_string()))
            }
        }
    }
}

impl TryFrom<String> for SubscriptionPattern {
    type Error = EmissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SubscriptionPattern> for String {
    fn from(value: SubscriptionPattern) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SubscriptionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Namespace(ns) => write!(f, "{ns}:*"),
            Self::Exact(t) => f.write_str(t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_three_shapes() {
        assert_eq!("*".parse::<SubscriptionPattern>().unwrap(), SubscriptionPattern::All);
        assert_eq!(
            "invoice:*".parse::<SubscriptionPattern>().unwrap(),
            SubscriptionPattern::Namespace("invoice".into())
        );
        assert_eq!(
            "invoice:paid".parse::<SubscriptionPattern>().unwrap(),
            SubscriptionPattern::exact("invoice:paid")
        );
        assert!(":*".parse::<SubscriptionPattern>().is_err());
        assert!("".parse::<SubscriptionPattern>().is_err());
    }

    #[test]
    fn wildcard_only_allowed_as_whole_pattern_or_namespace_suffix() {
        assert!("a*:*".parse::<SubscriptionPattern>().is_err());
        assert!("invoice:pa*d".parse::<SubscriptionPattern>().is_err());
        assert!("**".parse::<SubscriptionPattern>().is_err());
    }

    #[test]
    fn namespace_requires_separator() {
        let p = SubscriptionPattern::Namespace("invoice".into());
        assert!(p.matches("invoice:paid"));
        assert!(!p.matches("invoices:paid"));
        assert!(!p.matches("invoice"));
    }

    #[test]
    fn exact_and_all() {
        assert!(SubscriptionPattern::exact("a").matches("a"));
        assert!(!SubscriptionPattern::exact("a").matches("b"));
        assert!(SubscriptionPattern::All.matches("anything:at_all"));
    }
}
