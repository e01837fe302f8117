use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ripple_core::{Entity, ExpectedVersion};

use crate::model::Document;

/// A document together with its store-assigned version.
///
/// Every committed write bumps the version by one; a freshly inserted document
/// is at version `1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub doc: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u64, doc: T) -> Self {
        Self { version, doc }
    }
}

/// Document store operation error.
///
/// ## Error Categories
///
/// - **NotFound**: the target document does not exist (terminal for a trigger)
/// - **Conflict**: a conditional write lost an optimistic-concurrency race
///   (safe to retry the whole read-recompute-write cycle)
/// - **Poisoned**: a collection lock was poisoned by a panicking writer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("write conflict on {collection}/{id}: expected {expected:?}, found version {actual}")]
    Conflict {
        collection: &'static str,
        id: String,
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}

impl StoreError {
    pub fn not_found<D: Document>(id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            collection: D::COLLECTION,
            id: id.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Versioned parent documents with conditional writes.
///
/// This is the only write path for derived aggregate fields. Implementations
/// must make `write_if` atomic with respect to other writers of the same
/// document: the version check and the write happen under one lock (or one
/// native transaction of the backing store).
pub trait ParentStore<P: Document>: Send + Sync {
    /// Current document and version, `None` if missing.
    fn read(&self, id: P::Id) -> Result<Option<Versioned<P>>, StoreError>;

    /// Replace the document if its version satisfies `expected`.
    ///
    /// Returns the new version. Fails with [`StoreError::NotFound`] if the
    /// document is gone and [`StoreError::Conflict`] on a version mismatch.
    fn write_if(&self, id: P::Id, expected: ExpectedVersion, doc: P) -> Result<u64, StoreError>;
}

/// Authoritative child set of a parent.
///
/// Always the full set currently linked to `parent_id`, never a delta.
pub trait ChildQuery<P: Entity, C>: Send + Sync {
    fn children_of(&self, parent_id: P::Id) -> Result<Vec<C>, StoreError>;
}

impl<P, S> ParentStore<P> for Arc<S>
where
    P: Document,
    S: ParentStore<P> + ?Sized,
{
    fn read(&self, id: P::Id) -> Result<Option<Versioned<P>>, StoreError> {
        (**self).read(id)
    }

    fn write_if(&self, id: P::Id, expected: ExpectedVersion, doc: P) -> Result<u64, StoreError> {
        (**self).write_if(id, expected, doc)
    }
}

impl<P, C, S> ChildQuery<P, C> for Arc<S>
where
    P: Entity,
    S: ChildQuery<P, C> + ?Sized,
{
    fn children_of(&self, parent_id: P::Id) -> Result<Vec<C>, StoreError> {
        (**self).children_of(parent_id)
    }
}
