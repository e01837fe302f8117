use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use ripple_core::EventId;

use crate::payload::EventPayload;

/// Caller-supplied metadata for an emit.
///
/// `hop` counts how many emits deep a cascaded event sits: events emitted by
/// business modules are hop 0, an event emitted in reaction to a hop-0 event
/// is hop 1, and so on. The bus rejects events beyond its hop limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub source: String,
    pub causation_id: Option<EventId>,
    pub hop: u8,
}

impl EventMeta {
    /// Metadata for a root event emitted by a module.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            causation_id: None,
            hop: 0,
        }
    }

    /// Metadata for an event emitted in reaction to `parent`.
    pub fn caused_by(parent: &EventEnvelope, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            causation_id: Some(parent.id()),
            hop: parent.hop().saturating_add(1),
        }
    }
}

impl Default for EventMeta {
    fn default() -> Self {
        Self::from_source("system")
    }
}

/// Immutable record of a business occurrence.
///
/// Envelopes are only built by the bus during `emit()` and shared as
/// `Arc<EventEnvelope>` between the recent-event buffer and subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    id: EventId,
    data: EventPayload,
    source: String,
    timestamp: DateTime<Utc>,
    causation_id: Option<EventId>,
    hop: u8,
}

impl EventEnvelope {
    pub(crate) fn new(id: EventId, data: EventPayload, meta: EventMeta, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            data,
            source: meta.source,
            timestamp,
            causation_id: meta.causation_id,
            hop: meta.hop,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    /// Namespaced type tag, e.g. `"expense:created"`.
    pub fn event_type(&self) -> &str {
        self.data.event_type()
    }

    pub fn data(&self) -> &EventPayload {
        &self.data
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The event this one was emitted in reaction to, if any.
    pub fn causation_id(&self) -> Option<EventId> {
        self.causation_id
    }

    pub fn hop(&self) -> u8 {
        self.hop
    }
}

impl Serialize for EventEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("EventEnvelope", 7)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("type", self.event_type())?;
        s.serialize_field("data", &self.data.data_json())?;
        s.serialize_field("source", &self.source)?;
        s.serialize_field("timestamp", &self.timestamp)?;
        s.serialize_field("causation_id", &self.causation_id)?;
        s.serialize_field("hop", &self.hop)?;
        s.end()
    }
}
