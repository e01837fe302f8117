//! Event envelope, typed payload registry and the in-process event bus.

pub mod bus;
pub mod envelope;
pub mod error;
pub mod pattern;
pub mod payload;
pub mod ring;

pub use bus::{
    BusConfig, EmitReceipt, EventBus, EventHandler, SubscriptionHandle, SubscriptionId, WeakEventBus,
    panic_message,
};
pub use envelope::{EventEnvelope, EventMeta};
pub use error::{BusConfigError, EmissionError, HandlerError};
pub use pattern::SubscriptionPattern;
pub use payload::{
    EventPayload, ExpenseChanged, InvoicePaid, LeadConverted, ProjectChanged, TaskChanged, types,
};
pub use ring::RingBuffer;
