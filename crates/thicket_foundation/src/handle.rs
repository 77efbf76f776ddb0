//! Fact handles and entry point identifiers.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a named working-memory partition.
///
/// Index 0 is always the default entry point.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntryPointId(pub u32);

impl EntryPointId {
    /// The default entry point every session has.
    pub const DEFAULT: EntryPointId = EntryPointId(0);

    /// Returns the raw index of this entry point.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EntryPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPointId({})", self.0)
    }
}

/// Stable identity of a fact in working memory.
///
/// Ids are assigned from a per-session counter that only moves forward, so a
/// retracted handle's id is never handed out again. Two handles are equal only
/// if both the id and the owning entry point match.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactHandle {
    /// Monotonic fact id.
    pub id: u64,
    /// Entry point that owns the fact.
    pub entry_point: EntryPointId,
}

impl FactHandle {
    /// Creates a new fact handle.
    #[must_use]
    pub const fn new(id: u64, entry_point: EntryPointId) -> Self {
        Self { id, entry_point }
    }
}

impl fmt::Debug for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactHandle({}@{})", self.id, self.entry_point.0)
    }
}

impl fmt::Display for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fact({})", self.id)
    }
}
