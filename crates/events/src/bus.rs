//! In-process event bus: typed emit, pattern subscriptions, recent-event history.
//!
//! This module provides the **event bus pattern** used by every business module to
//! announce what happened, without knowing who reacts.
//!
//! ## Design Philosophy
//!
//! - **Explicit instance**: a bus is constructed and injected; tests build isolated buses
//! - **Synchronous fan-out**: `emit()` returns only after every matching handler returned
//! - **Failure isolation**: a handler error or panic is logged and swallowed; siblings still run
//! - **Memory only**: history and subscriptions do not survive a restart
//!
//! ## Ordering
//!
//! Within one `emit()`, handlers run in subscription-registration order. Concurrent
//! `emit()` calls from different threads may interleave; each call still observes
//! registration order for its own handlers.
//!
//! ## Locking
//!
//! The subscriber table and the history buffer each sit behind their own `RwLock`.
//! Neither lock is held while handlers run, so a handler may emit (cascade) or
//! subscribe without deadlocking.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};

use ripple_core::EventId;

use crate::envelope::{EventEnvelope, EventMeta};
use crate::error::{BusConfigError, EmissionError, HandlerError};
use crate::pattern::SubscriptionPattern;
use crate::payload::EventPayload;
use crate::ring::RingBuffer;

/// Bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Number of recent events retained for audit/telemetry.
    pub capacity: usize,
    /// Deepest cascade accepted (root emits are hop 0). At most 254, so the
    /// next hop always exceeds it.
    pub max_hops: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_hops: 5,
        }
    }
}

impl BusConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_hops(mut self, max_hops: u8) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn validate(&self) -> Result<(), BusConfigError> {
        if self.capacity == 0 {
            return Err(BusConfigError("capacity must be at least 1".to_string()));
        }
        // Hops saturate at u8::MAX; a limit there could never be exceeded.
        if self.max_hops == u8::MAX {
            return Err(BusConfigError(format!("max_hops must be below {}", u8::MAX)));
        }
        Ok(())
    }
}

/// Something that reacts to events.
///
/// Implemented for any `Fn(&EventEnvelope) -> Result<(), HandlerError>`.
pub trait EventHandler: Send + Sync {
    fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(&EventEnvelope) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        self(envelope)
    }
}

/// Identifier of a single registration on a bus.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct SubscriberEntry {
    id: SubscriptionId,
    handler_id: Arc<str>,
    pattern: SubscriptionPattern,
    handler: Arc<dyn EventHandler>,
}

struct BusInner {
    config: BusConfig,
    subscribers: RwLock<Vec<SubscriberEntry>>,
    history: RwLock<RingBuffer<Arc<EventEnvelope>>>,
    next_subscription: AtomicU64,
    emitted: AtomicU64,
    disposed: AtomicBool,
}

impl BusInner {
    fn remove(&self, id: SubscriptionId) -> bool {
        match self.subscribers.write() {
            Ok(mut subs) => {
                let before = subs.len();
                subs.retain(|s| s.id != id);
                subs.len() != before
            }
            Err(_) => false,
        }
    }
}

/// Capability to remove exactly one registration.
///
/// Dropping the handle does **not** unsubscribe; call [`SubscriptionHandle::unsubscribe`].
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    bus: Weak<BusInner>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove this registration. Returns `false` if it was already gone
    /// (or the bus no longer exists).
    pub fn unsubscribe(&self) -> bool {
        match self.bus.upgrade() {
            Some(inner) => inner.remove(self.id),
            None => false,
        }
    }
}

impl core::fmt::Debug for BusInner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BusInner")
            .field("config", &self.config)
            .field("emitted", &self.emitted.load(Ordering::Relaxed))
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Result of a successful `emit()`.
#[derive(Debug, Clone)]
pub struct EmitReceipt {
    pub envelope: Arc<EventEnvelope>,
    /// Handlers whose pattern matched and that were invoked.
    pub handlers_invoked: usize,
    /// Handlers among those that returned an error or panicked.
    pub handlers_failed: usize,
}

impl EmitReceipt {
    pub fn event_id(&self) -> EventId {
        self.envelope.id()
    }
}

/// Weak reference to an [`EventBus`].
#[derive(Debug, Clone)]
pub struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}

/// Process-local pub/sub dispatcher.
///
/// Cheap to clone; clones share the same subscribers and history.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::build(BusConfig::default())
    }
}

impl EventBus {
    pub fn new(config: BusConfig) -> Result<Self, BusConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                history: RwLock::new(RingBuffer::new(config.capacity)),
                config,
                subscribers: RwLock::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                emitted: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Non-owning handle, for subscribers that need to emit back into the
    /// bus that holds them.
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Register `handler` for every event matching `pattern`.
    pub fn subscribe<F>(&self, pattern: SubscriptionPattern, handler: F) -> SubscriptionHandle
    where
        F: Fn(&EventEnvelope) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.insert(id, format!("subscription-{}", id.0), pattern, Arc::new(handler))
    }

    /// Like [`EventBus::subscribe`], with a handler id used in failure logs.
    pub fn subscribe_named<F>(
        &self,
        handler_id: impl Into<String>,
        pattern: SubscriptionPattern,
        handler: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&EventEnvelope) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.insert(id, handler_id.into(), pattern, Arc::new(handler))
    }

    /// Register a shared handler object.
    pub fn subscribe_handler(
        &self,
        handler_id: impl Into<String>,
        pattern: SubscriptionPattern,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionHandle {
        let id = self.next_id();
        self.insert(id, handler_id.into(), pattern, handler)
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(
        &self,
        id: SubscriptionId,
        handler_id: String,
        pattern: SubscriptionPattern,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionHandle {
        // If the lock is poisoned we still hand out a handle; the
        // registration simply never receives events.
        if let Ok(mut subs) = self.inner.subscribers.write() {
            debug!(handler_id = %handler_id, pattern = %pattern, "subscribed");
            subs.push(SubscriberEntry {
                id,
                handler_id: handler_id.into(),
                pattern,
                handler,
            });
        }

        SubscriptionHandle {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Emit an event described by `meta`.
    ///
    /// A [`EventPayload::Custom`] carrying a modelled type is decoded into its
    /// typed variant first, so it is rejected as malformed if the data does
    /// not fit.
    pub fn emit(&self, payload: EventPayload, meta: EventMeta) -> Result<EmitReceipt, EmissionError> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(EmissionError::Disposed);
        }
        let payload = payload.normalize()?;

        let max_hops = self.inner.config.max_hops;
        if meta.hop > max_hops {
            warn!(
                event_type = payload.event_type(),
                hop = meta.hop,
                max_hops,
                causation_id = ?meta.causation_id,
                "rejecting cascaded event beyond hop limit"
            );
            return Err(EmissionError::HopLimitExceeded {
                event_type: payload.event_type().to_string(),
                hop: meta.hop,
                max_hops,
            });
        }

        let envelope = Arc::new(EventEnvelope::new(EventId::new(), payload, meta, Utc::now()));

        {
            let mut history = self
                .inner
                .history
                .write()
                .map_err(|_| EmissionError::Poisoned)?;
            history.push(envelope.clone());
        }
        self.inner.emitted.fetch_add(1, Ordering::Relaxed);

        let (handlers_invoked, handlers_failed) = self.dispatch(&envelope);

        Ok(EmitReceipt {
            envelope,
            handlers_invoked,
            handlers_failed,
        })
    }

    /// Emit from an untyped `(type, json)` pair, recovering the typed payload.
    pub fn emit_raw(
        &self,
        event_type: &str,
        data: JsonValue,
        meta: EventMeta,
    ) -> Result<EmitReceipt, EmissionError> {
        let payload = EventPayload::from_raw(event_type, data)?;
        self.emit(payload, meta)
    }

    /// Emit an event in reaction to `parent` (one hop deeper).
    pub fn emit_caused_by(
        &self,
        parent: &EventEnvelope,
        payload: EventPayload,
        source: impl Into<String>,
    ) -> Result<EmitReceipt, EmissionError> {
        self.emit(payload, EventMeta::caused_by(parent, source))
    }

    fn dispatch(&self, envelope: &EventEnvelope) -> (usize, usize) {
        let matching: Vec<(Arc<str>, Arc<dyn EventHandler>)> = match self.inner.subscribers.read() {
            Ok(subs) => subs
                .iter()
                .filter(|s| s.pattern.matches(envelope.event_type()))
                .map(|s| (s.handler_id.clone(), s.handler.clone()))
                .collect(),
            Err(_) => {
                error!(event_id = %envelope.id(), "subscriber table poisoned; event not dispatched");
                return (0, 0);
            }
        };

        let mut failed = 0;
        for (handler_id, handler) in &matching {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(envelope))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failed += 1;
                    warn!(
                        event_id = %envelope.id(),
                        event_type = envelope.event_type(),
                        handler_id = %handler_id,
                        error = %err,
                        "event handler failed"
                    );
                }
                Err(panic) => {
                    failed += 1;
                    error!(
                        event_id = %envelope.id(),
                        event_type = envelope.event_type(),
                        handler_id = %handler_id,
                        panic = %panic_message(panic.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }

        (matching.len(), failed)
    }

    /// Recent events, most-recent-first, at most `min(limit, capacity)`.
    pub fn recent_events(&self, limit: usize) -> Vec<Arc<EventEnvelope>> {
        match self.inner.history.read() {
            Ok(history) => history.iter_recent().take(limit).cloned().collect(),
            Err(_) => vec![],
        }
    }

    /// Number of events currently held in the history buffer.
    pub fn history_len(&self) -> usize {
        self.inner.history.read().map(|h| h.len()).unwrap_or(0)
    }

    /// Monotonic count of accepted emits (not capped by history capacity).
    pub fn total_emitted(&self) -> u64 {
        self.inner.emitted.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Tear down: drop all subscriptions and history; later emits fail with
    /// [`EmissionError::Disposed`].
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::Release);
        if let Ok(mut subs) = self.inner.subscribers.write() {
            subs.clear();
        }
        if let Ok(mut history) = self.inner.history.write() {
            history.clear();
        }
        debug!("event bus disposed");
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::types;
    use std::sync::Mutex;

    use proptest::prelude::*;
    use serde_json::json;

    fn custom(event_type: &str) -> EventPayload {
        EventPayload::custom(event_type, json!({}))
    }

    fn meta() -> EventMeta {
        EventMeta::from_source("test")
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = seen.clone();
            bus.subscribe(SubscriptionPattern::exact("a:b"), move |_: &EventEnvelope| {
                seen.lock().unwrap().push(n);
                Ok(())
            });
        }

        let receipt = bus.emit(custom("a:b"), meta()).unwrap();
        assert_eq!(receipt.handlers_invoked, 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_and_panicking_handlers_do_not_block_siblings() {
        let bus = EventBus::default();
        let ran = Arc::new(AtomicU64::new(0));

        bus.subscribe_named("always-fails", SubscriptionPattern::exact("t"), |_: &EventEnvelope| {
            Err(HandlerError::new("boom"))
        });
        bus.subscribe_named("always-panics", SubscriptionPattern::exact("t"), |_: &EventEnvelope| {
            panic!("handler bug")
        });
        let ran2 = ran.clone();
        bus.subscribe(SubscriptionPattern::exact("t"), move |_: &EventEnvelope| {
            ran2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let receipt = bus.emit(custom("t"), meta()).unwrap();
        assert_eq!(receipt.handlers_invoked, 3);
        assert_eq!(receipt.handlers_failed, 2);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wildcard_receives_each_type_once_in_order() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        bus.subscribe(SubscriptionPattern::All, move |env: &EventEnvelope| {
            seen2.lock().unwrap().push(env.event_type().to_string());
            Ok(())
        });

        bus.emit(custom("a"), meta()).unwrap();
        bus.emit(custom("b"), meta()).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unsubscribe_removes_exactly_one_registration() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicU64::new(0));

        let c1 = count.clone();
        let first = bus.subscribe(SubscriptionPattern::exact("x"), move |_: &EventEnvelope| {
            c1.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let c2 = count.clone();
        bus.subscribe(SubscriptionPattern::exact("x"), move |_: &EventEnvelope| {
            c2.fetch_add(10, Ordering::SeqCst);
            Ok(())
        });

        assert!(first.unsubscribe());
        assert!(!first.unsubscribe());
        bus.emit(custom("x"), meta()).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 10);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn handler_may_emit_reentrantly() {
        let bus = EventBus::default();
        let inner_bus = bus.clone();
        bus.subscribe(SubscriptionPattern::exact("outer"), move |env: &EventEnvelope| {
            inner_bus
                .emit_caused_by(env, custom("inner"), "test")
                .map(|_| ())
                .map_err(|e| HandlerError::new(e.to_string()))
        });

        bus.emit(custom("outer"), meta()).unwrap();

        let recent = bus.recent_events(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type(), "inner");
        assert_eq!(recent[0].hop(), 1);
        assert_eq!(recent[0].causation_id(), Some(recent[1].id()));
    }

    #[test]
    fn cascades_stop_at_hop_limit() {
        let bus = EventBus::new(BusConfig::default().with_max_hops(3)).unwrap();
        let loop_bus = bus.clone();
        bus.subscribe(SubscriptionPattern::exact("ping"), move |env: &EventEnvelope| {
            // Re-emits itself forever; only the hop limit ends this.
            let _ = loop_bus.emit_caused_by(env, custom("ping"), "test");
            Ok(())
        });

        bus.emit(custom("ping"), meta()).unwrap();

        // hops 0..=3 accepted, hop 4 rejected
        assert_eq!(bus.total_emitted(), 4);
    }

    #[test]
    fn missing_type_is_rejected_synchronously() {
        let bus = EventBus::default();
        let err = bus.emit_raw("", json!({}), meta()).unwrap_err();
        assert_eq!(err, EmissionError::MissingType);
        assert_eq!(bus.total_emitted(), 0);
        assert!(bus.recent_events(10).is_empty());
    }

    #[test]
    fn custom_payload_with_known_tag_reaches_handlers_typed() {
        let bus = EventBus::default();
        let typed = Arc::new(AtomicU64::new(0));
        let typed2 = typed.clone();
        bus.subscribe(SubscriptionPattern::exact(types::PROJECT_UPDATED), move |env: &EventEnvelope| {
            if matches!(env.data(), EventPayload::ProjectUpdated(_)) {
                typed2.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        let project_id = ripple_core::ProjectId::new();
        let receipt = bus
            .emit(
                EventPayload::custom(types::PROJECT_UPDATED, json!({ "project_id": project_id })),
                meta(),
            )
            .unwrap();
        assert!(matches!(receipt.envelope.data(), EventPayload::ProjectUpdated(_)));
        assert_eq!(typed.load(Ordering::SeqCst), 1);

        let err = bus
            .emit(EventPayload::custom(types::PROJECT_UPDATED, json!({})), meta())
            .unwrap_err();
        assert!(matches!(err, EmissionError::MalformedPayload { .. }));
        assert_eq!(bus.total_emitted(), 1);
    }

    #[test]
    fn wildcard_types_cannot_be_emitted() {
        let bus = EventBus::default();
        for tag in ["*", "invoice:*"] {
            assert_eq!(
                bus.emit(custom(tag), meta()).unwrap_err(),
                EmissionError::InvalidType(tag.to_string())
            );
        }
        assert_eq!(bus.total_emitted(), 0);
    }

    #[test]
    fn dispose_rejects_further_emits() {
        let bus = EventBus::default();
        bus.subscribe(SubscriptionPattern::All, |_: &EventEnvelope| Ok(()));
        bus.emit(custom("a"), meta()).unwrap();

        bus.dispose();

        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.recent_events(10).is_empty());
        assert_eq!(bus.emit(custom("a"), meta()).unwrap_err(), EmissionError::Disposed);
    }

    #[test]
    fn zero_capacity_config_is_rejected() {
        assert!(EventBus::new(BusConfig::default().with_capacity(0)).is_err());
    }

    #[test]
    fn hop_limit_must_stay_below_saturation() {
        assert!(EventBus::new(BusConfig::default().with_max_hops(u8::MAX)).is_err());
        assert!(BusConfig::default().with_max_hops(u8::MAX - 1).validate().is_ok());
    }

    #[test]
    fn saturated_hop_is_always_rejected() {
        let bus = EventBus::new(BusConfig::default().with_max_hops(u8::MAX - 1)).unwrap();
        let meta = EventMeta {
            hop: u8::MAX,
            ..meta()
        };
        let err = bus.emit(custom("ping"), meta).unwrap_err();
        assert!(matches!(err, EmissionError::HopLimitExceeded { hop: 255, max_hops: 254, .. }));
        assert_eq!(bus.total_emitted(), 0);
    }

    #[test]
    fn total_emitted_is_not_capped_by_capacity() {
        let bus = EventBus::new(BusConfig::default().with_capacity(2)).unwrap();
        for _ in 0..5 {
            bus.emit(custom("a"), meta()).unwrap();
        }
        assert_eq!(bus.total_emitted(), 5);
        assert_eq!(bus.history_len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// For N emits with N > capacity C, the buffer returns exactly the
        /// last C events, newest first.
        #[test]
        fn history_keeps_last_capacity_events(capacity in 1usize..20, extra in 1usize..20) {
            let bus = EventBus::new(BusConfig::default().with_capacity(capacity)).unwrap();
            let total = capacity + extra;

            let mut ids = Vec::new();
            for n in 0..total {
                let receipt = bus.emit(custom(&format!("seq:{n}")), meta()).unwrap();
                ids.push(receipt.event_id());
            }

            let recent = bus.recent_events(capacity);
            prop_assert_eq!(recent.len(), capacity);

            let expected: Vec<EventId> = ids.iter().rev().take(capacity).copied().collect();
            let got: Vec<EventId> = recent.iter().map(|e| e.id()).collect();
            prop_assert_eq!(got, expected);

            prop_assert_eq!(bus.recent_events(capacity + 5).len(), capacity);
            prop_assert_eq!(bus.recent_events(1).len(), 1);
        }
    }
}
