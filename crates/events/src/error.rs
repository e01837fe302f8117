//! Event bus error taxonomy.

use thiserror::Error;

/// Rejection of an `emit()` call.
///
/// This is the only failure the bus surfaces to callers: a malformed envelope
/// is a bug at the call site. Subscriber faults never turn into an
/// `EmissionError`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmissionError {
    /// The event type tag is empty or blank.
    #[error("event type is missing")]
    MissingType,

    /// The event type tag contains whitespace or control characters.
    #[error("invalid event type '{0}'")]
    InvalidType(String),

    /// A known event type carried data that does not fit its payload shape.
    #[error("malformed payload for '{event_type}': {reason}")]
    MalformedPayload { event_type: String, reason: String },

    /// A cascaded emit went deeper than the configured hop limit.
    #[error("hop limit exceeded for '{event_type}' (hop {hop}, max {max_hops})")]
    HopLimitExceeded {
        event_type: String,
        hop: u8,
        max_hops: u8,
    },

    /// The bus was disposed; it no longer accepts events.
    #[error("event bus has been disposed")]
    Disposed,

    /// Internal lock poisoning.
    #[error("event bus state poisoned")]
    Poisoned,
}

/// Failure reported by a subscriber while handling an event.
///
/// Caught and logged at the dispatch boundary; never propagated to the
/// emitter or to sibling subscribers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Invalid bus configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid bus config: {0}")]
pub struct BusConfigError(pub String);
