//! Optimistic concurrency expectations for versioned documents.

/// Optimistic concurrency expectation for a document write.
///
/// Every committed write bumps a document's version by one. A conditional
/// write carrying `Exact(v)` only succeeds if nobody committed since `v` was
/// read.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (blind overwrite; seeding and tests only).
    Any,
    /// Require the document to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}
