//! Unit of work over one parent document.
//!
//! `run_transaction` reads the parent and its version, hands the current
//! document to the body (which may query whatever else it needs), and commits
//! the staged replacement only if the parent is still at the version that was
//! read. A concurrent commit in between surfaces as [`StoreError::Conflict`];
//! nothing is written in that case and the caller decides whether to retry.
//!
//! The body may fail with its own error type as long as store errors convert
//! into it.

use ripple_core::ExpectedVersion;

use crate::model::Document;

use super::r#trait::{ParentStore, StoreError};

/// Result of recomputing a parent's derived fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recompute<P> {
    /// Stage this replacement document.
    Write(P),
    /// Leave the parent as it is (no write, no version bump).
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Committed { version: u64 },
    Unchanged { version: u64 },
}

impl TxOutcome {
    pub fn version(&self) -> u64 {
        match self {
            TxOutcome::Committed { version } | TxOutcome::Unchanged { version } => *version,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, TxOutcome::Committed { .. })
    }
}

pub fn run_transaction<P, S, F, E>(store: &S, id: P::Id, body: F) -> Result<TxOutcome, E>
where
    P: Document,
    S: ParentStore<P> + ?Sized,
    F: FnOnce(&P) -> Result<Recompute<P>, E>,
    E: From<StoreError>,
{
    let current = store
        .read(id)?
        .ok_or_else(|| StoreError::not_found::<P>(id))?;

    match body(&current.doc)? {
        Recompute::Write(next) => {
            let version = store.write_if(id, ExpectedVersion::Exact(current.version), next)?;
            Ok(TxOutcome::Committed { version })
        }
        Recompute::Unchanged => Ok(TxOutcome::Unchanged {
            version: current.version,
        }),
    }
}
