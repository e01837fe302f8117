//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stored documents (projects, expenses, tasks) are entities: the store keys
/// them by `id()` and versions them independently of their contents.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
