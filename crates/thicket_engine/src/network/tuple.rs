//! Tuple arena.
//!
//! Partial matches (tuples) live in a per-session arena and are addressed by
//! generation-checked [`TupleId`]s. A slot's generation is bumped on release,
//! so a stale id held after its tuple was retired is detected instead of
//! silently reading a recycled slot.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use thicket_foundation::{Error, ErrorKind, FactHandle, Result, Value};

/// Generation-checked index into the tuple arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleId {
    index: u32,
    generation: u32,
}

/// One slot of a tuple, one per rule condition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TupleEntry {
    /// A positive pattern matched this fact.
    Fact(FactHandle),
    /// A not/exists condition holds; nothing is bound.
    Absent,
    /// An accumulate condition produced this result.
    Accumulated(Value),
}

impl TupleEntry {
    /// The fact handle, if this slot holds one.
    #[must_use]
    pub const fn handle(&self) -> Option<FactHandle> {
        match self {
            Self::Fact(h) => Some(*h),
            _ => None,
        }
    }
}

/// An immutable partial match.
#[derive(Clone, Debug)]
pub struct Tuple {
    /// Slots, one per condition matched so far.
    pub entries: Vec<TupleEntry>,
}

impl Tuple {
    /// Fact handles in slot order.
    pub fn handles(&self) -> impl Iterator<Item = FactHandle> + '_ {
        self.entries.iter().filter_map(TupleEntry::handle)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    tuple: Option<Tuple>,
}

/// Generational arena of tuples.
#[derive(Debug, Default)]
pub struct TupleArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl TupleArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a tuple and returns its id.
    ///
    /// # Errors
    /// Returns `Internal` if the arena exceeds `u32::MAX` slots.
    pub fn alloc(&mut self, tuple: Tuple) -> Result<TupleId> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.tuple = Some(tuple);
            self.live += 1;
            return Ok(TupleId {
                index,
                generation: slot.generation,
            });
        }
        let index = u32::try_from(self.slots.len())
            .map_err(|_| Error::new(ErrorKind::Internal("tuple arena full".into())))?;
        self.slots.push(Slot {
            generation: 0,
            tuple: Some(tuple),
        });
        self.live += 1;
        Ok(TupleId {
            index,
            generation: 0,
        })
    }

    /// Looks up a live tuple.
    ///
    /// # Errors
    /// Returns `InconsistentNetworkState` for a stale or unknown id.
    pub fn get(&self, id: TupleId) -> Result<&Tuple> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.tuple.as_ref())
            .ok_or_else(|| Error::inconsistent(format!("stale tuple reference {id:?}")))
    }

    /// Retires a tuple, invalidating its id.
    ///
    /// # Errors
    /// Returns `InconsistentNetworkState` for a stale or unknown id.
    pub fn release(&mut self, id: TupleId) -> Result<Tuple> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .ok_or_else(|| Error::inconsistent(format!("release of stale tuple {id:?}")))?;
        let tuple = slot
            .tuple
            .take()
            .ok_or_else(|| Error::inconsistent(format!("double release of tuple {id:?}")))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Ok(tuple)
    }

    /// Number of live tuples.
    #[must_use]
    pub const fn live(&self) -> usize {
        self.live
    }
}
