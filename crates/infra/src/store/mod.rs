//! Document store boundary used by the consistency triggers.
//!
//! The triggers need exactly two capabilities from the host store: the full
//! child set of a parent, and a read-then-conditional-write on the parent.
//! Both are expressed here as traits so the trigger runner stays independent
//! of the storage engine.

pub mod in_memory;
pub mod transaction;
pub mod r#trait;

pub use in_memory::InMemoryDocumentStore;
pub use r#trait::{ChildQuery, ParentStore, StoreError, Versioned};
pub use transaction::{Recompute, TxOutcome, run_transaction};
