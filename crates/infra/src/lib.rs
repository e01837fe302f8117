//! Infrastructure layer: document store, consistency triggers, config.

pub mod config;
pub mod model;
pub mod retry;
pub mod service;
pub mod store;
pub mod triggers;


pub use config::{ApiConfig, ConfigError, EngineConfig, TriggerConfig};
pub use model::{Document, Expense, Project, Task};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use service::{ProjectService, ServiceError};
pub use store::{
    ChildQuery, InMemoryDocumentStore, ParentStore, Recompute, StoreError, TxOutcome, Versioned, run_transaction,
};
pub use triggers::{
    BudgetTrigger, ConsistencyTrigger, ProgressTrigger, RecomputeError, RegisterTriggerError, TriggerError,
    TriggerReport, TriggerRunner, register_trigger,
};
