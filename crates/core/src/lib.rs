//! `ripple-core`: shared building blocks for the automation engine.
//!
//! This crate contains **pure** primitives (identifiers, errors, money,
//! optimistic-concurrency versions). No IO, no threading.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod version;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    AgentId, CustomerId, EventId, ExpenseId, InvoiceId, LeadId, ProjectId, RuleId, TaskId,
};
pub use money::Money;
pub use version::ExpectedVersion;
