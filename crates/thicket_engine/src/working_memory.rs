//! Fact handle registry and session clock.
//!
//! The registry is the single source of truth for which handles are live and
//! what value each one holds. Records are kept in a persistent ordered map, so
//! enumeration is in handle-id order and cloning the registry for a snapshot
//! is O(1).

use std::collections::{BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use thicket_foundation::{EntryPointId, Error, Fact, FactHandle, KeywordId, Result};

use crate::config::ClockType;

// =============================================================================
// Records
// =============================================================================

/// Timing data of a fact inserted into a stream entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventMetadata {
    /// Session clock time at insertion, in milliseconds.
    pub timestamp: u64,
    /// Duration in milliseconds (zero for point-in-time events).
    pub duration: u64,
}

impl EventMetadata {
    /// End of the event interval.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.timestamp.saturating_add(self.duration)
    }
}

/// A live fact and its bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactRecord {
    /// Handle of the fact.
    pub handle: FactHandle,
    /// Current value.
    pub fact: Fact,
    /// Event timing, for facts in stream entry points.
    pub event: Option<EventMetadata>,
    /// True for logically asserted (justified) facts.
    pub logical: bool,
}

// =============================================================================
// Registry
// =============================================================================

type ValueKey = (EntryPointId, Fact);

/// Live facts of a session.
#[derive(Clone, Debug, Default)]
pub struct FactRegistry {
    records: im::OrdMap<FactHandle, FactRecord>,
    by_type: HashMap<KeywordId, BTreeSet<FactHandle>>,
    direct_by_value: HashMap<ValueKey, BTreeSet<FactHandle>>,
    logical_by_value: HashMap<ValueKey, BTreeSet<FactHandle>>,
    next_id: u64,
}

impl FactRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh handle. Ids are never reused.
    pub fn allocate(&mut self, entry_point: EntryPointId) -> FactHandle {
        self.next_id += 1;
        FactHandle::new(self.next_id, entry_point)
    }

    /// The id the next allocated handle will carry, minus one.
    #[must_use]
    pub const fn last_id(&self) -> u64 {
        self.next_id
    }

    pub(crate) fn set_last_id(&mut self, id: u64) {
        self.next_id = id;
    }

    /// Stores a record under its handle.
    ///
    /// # Errors
    /// Returns `InconsistentNetworkState` if the handle is already live.
    pub fn insert(&mut self, record: FactRecord) -> Result<()> {
        let handle = record.handle;
        if self.records.contains_key(&handle) {
            return Err(Error::inconsistent(format!("{handle:?} registered twice")));
        }
        self.index(&record);
        self.records.insert(handle, record);
        Ok(())
    }

    /// Replaces the value of a live fact, returning the old value.
    ///
    /// # Errors
    /// Returns `UnknownHandle` if the handle is not live.
    pub fn replace(&mut self, handle: FactHandle, fact: Fact) -> Result<Fact> {
        let mut record = self
            .records
            .get(&handle)
            .cloned()
            .ok_or_else(|| Error::unknown_handle(handle))?;
        self.unindex(&record);
        let old = std::mem::replace(&mut record.fact, fact);
        self.index(&record);
        self.records.insert(handle, record);
        Ok(old)
    }

    /// Removes a live fact.
    ///
    /// # Errors
    /// Returns `UnknownHandle` if the handle is not live.
    pub fn remove(&mut self, handle: FactHandle) -> Result<FactRecord> {
        let record = self
            .records
            .remove(&handle)
            .ok_or_else(|| Error::unknown_handle(handle))?;
        self.unindex(&record);
        Ok(record)
    }

    fn index(&mut self, record: &FactRecord) {
        self.by_type
            .entry(record.fact.object_type())
            .or_default()
            .insert(record.handle);
        let key = (record.handle.entry_point, record.fact.clone());
        let by_value = if record.logical {
            &mut self.logical_by_value
        } else {
            &mut self.direct_by_value
        };
        by_value.entry(key).or_default().insert(record.handle);
    }

    fn unindex(&mut self, record: &FactRecord) {
        let object_type = record.fact.object_type();
        if let Some(set) = self.by_type.get_mut(&object_type) {
            set.remove(&record.handle);
            if set.is_empty() {
                self.by_type.remove(&object_type);
            }
        }
        let key = (record.handle.entry_point, record.fact.clone());
        let by_value = if record.logical {
            &mut self.logical_by_value
        } else {
            &mut self.direct_by_value
        };
        if let Some(set) = by_value.get_mut(&key) {
            set.remove(&record.handle);
            if set.is_empty() {
                by_value.remove(&key);
            }
        }
    }

    /// Record of a live fact.
    #[must_use]
    pub fn get(&self, handle: FactHandle) -> Option<&FactRecord> {
        self.records.get(&handle)
    }

    /// Value of a live fact.
    #[must_use]
    pub fn fact(&self, handle: FactHandle) -> Option<&Fact> {
        self.records.get(&handle).map(|r| &r.fact)
    }

    /// Returns true if the handle is live.
    #[must_use]
    pub fn is_live(&self, handle: FactHandle) -> bool {
        self.records.contains_key(&handle)
    }

    /// Number of live facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no facts are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All live records in handle-id order.
    pub fn iter(&self) -> impl Iterator<Item = &FactRecord> {
        self.records.values()
    }

    /// Live handles of one object type, in id order.
    #[must_use]
    pub fn handles_of_type(&self, object_type: KeywordId) -> Vec<FactHandle> {
        self.by_type
            .get(&object_type)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Oldest live direct fact equal to `fact` in the entry point.
    #[must_use]
    pub fn find_direct(&self, entry_point: EntryPointId, fact: &Fact) -> Option<FactHandle> {
        self.direct_by_value
            .get(&(entry_point, fact.clone()))
            .and_then(|s| s.iter().next().copied())
    }

    /// Oldest live justified fact equal to `fact` in the entry point.
    #[must_use]
    pub fn find_logical(&self, entry_point: EntryPointId, fact: &Fact) -> Option<FactHandle> {
        self.logical_by_value
            .get(&(entry_point, fact.clone()))
            .and_then(|s| s.iter().next().copied())
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Time source for event timestamps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionClock {
    kind: ClockType,
    now: u64,
}

impl SessionClock {
    /// Creates a clock of the given type, starting at zero for pseudo clocks.
    #[must_use]
    pub const fn new(kind: ClockType) -> Self {
        Self { kind, now: 0 }
    }

    /// Clock type.
    #[must_use]
    pub const fn kind(&self) -> ClockType {
        self.kind
    }

    /// Current time in milliseconds.
    #[must_use]
    pub fn now(&self) -> u64 {
        match self.kind {
            ClockType::Pseudo => self.now,
            ClockType::Realtime => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// Advances a pseudo clock. Has no effect on a realtime clock.
    pub fn advance(&mut self, millis: u64) {
        self.now = self.now.saturating_add(millis);
    }

    /// Sets a pseudo clock to an absolute time.
    pub(crate) fn set(&mut self, millis: u64) {
        self.now = millis;
    }
}
