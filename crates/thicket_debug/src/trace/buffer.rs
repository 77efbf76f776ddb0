//! Ring buffer for trace records.
//!
//! Keeps the most recent records and answers queries by firing, rule, and
//! fact handle.

use std::collections::{HashMap, VecDeque};

use thicket_engine::SessionEvent;
use thicket_foundation::FactHandle;

use super::record::TraceRecord;

// =============================================================================
// Trace Buffer
// =============================================================================

/// A ring buffer for storing trace records.
///
/// Maintains a fixed maximum size, discarding oldest records when full.
#[derive(Clone, Debug)]
pub struct TraceBuffer {
    /// The records, oldest first.
    records: VecDeque<TraceRecord>,
    /// Maximum number of records to store.
    max_size: usize,
    /// Next record ID to assign.
    next_id: u64,
}

impl TraceBuffer {
    /// Creates a new trace buffer with the given maximum size.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
            next_id: 0,
        }
    }

    /// Creates a buffer with default size (10000 records).
    #[must_use]
    pub fn default_size() -> Self {
        Self::new(10000)
    }

    /// Pushes a new event to the buffer.
    ///
    /// Returns the assigned record ID.
    pub fn push(&mut self, firing: u64, timestamp_ns: u64, event: SessionEvent) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        self.records
            .push_back(TraceRecord::new(id, firing, timestamp_ns, event));
        while self.records.len() > self.max_size {
            self.records.pop_front();
        }

        id
    }

    /// Returns the number of records in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Clears all records from the buffer.
    ///
    /// Record IDs keep increasing across clears.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Returns an iterator over all records.
    pub fn iter(&self) -> impl Iterator<Item = &TraceRecord> {
        self.records.iter()
    }

    /// Returns records produced during one firing.
    #[must_use]
    pub fn records_for_firing(&self, firing: u64) -> Vec<&TraceRecord> {
        self.filter(|r| r.firing == firing)
    }

    /// Returns records in a firing range (inclusive).
    #[must_use]
    pub fn records_in_range(&self, start: u64, end: u64) -> Vec<&TraceRecord> {
        self.filter(|r| r.firing >= start && r.firing <= end)
    }

    /// Returns the most recent N records.
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<&TraceRecord> {
        let start = self.records.len().saturating_sub(count);
        self.records.iter().skip(start).collect()
    }

    /// Returns records matching a predicate.
    pub fn filter<F>(&self, predicate: F) -> Vec<&TraceRecord>
    where
        F: Fn(&TraceRecord) -> bool,
    {
        self.records.iter().filter(|r| predicate(r)).collect()
    }

    /// Returns records of a specific event type.
    #[must_use]
    pub fn by_event_type(&self, event_type: &str) -> Vec<&TraceRecord> {
        self.filter(|r| r.event_type() == event_type)
    }

    /// Returns agenda and firing records for one rule.
    #[must_use]
    pub fn by_rule(&self, rule: &str) -> Vec<&TraceRecord> {
        self.filter(|r| r.rule() == Some(rule))
    }

    /// Returns working-memory and justification records for one fact.
    #[must_use]
    pub fn by_handle(&self, handle: FactHandle) -> Vec<&TraceRecord> {
        self.filter(|r| r.handle() == Some(handle))
    }

    /// Returns the oldest firing number in the buffer.
    #[must_use]
    pub fn oldest_firing(&self) -> Option<u64> {
        self.records.front().map(|r| r.firing)
    }

    /// Returns the newest firing number in the buffer.
    #[must_use]
    pub fn newest_firing(&self) -> Option<u64> {
        self.records.back().map(|r| r.firing)
    }

    /// Returns all distinct firing numbers in the buffer, in order.
    #[must_use]
    pub fn firings(&self) -> Vec<u64> {
        let mut firings: Vec<u64> = self.records.iter().map(|r| r.firing).collect();
        firings.dedup();
        firings
    }

    /// Returns statistics about the buffer.
    #[must_use]
    pub fn stats(&self) -> TraceBufferStats {
        let mut event_counts = HashMap::new();
        for record in &self.records {
            *event_counts.entry(record.event_type()).or_insert(0) += 1;
        }

        TraceBufferStats {
            record_count: self.records.len(),
            max_size: self.max_size,
            oldest_firing: self.oldest_firing(),
            newest_firing: self.newest_firing(),
            firing_count: self.firings().len(),
            event_counts,
        }
    }
}

impl Default for TraceBuffer {
    fn default() -> Self {
        Self::default_size()
    }
}

// =============================================================================
// Buffer Statistics
// =============================================================================

/// Statistics about a trace buffer.
#[derive(Clone, Debug)]
pub struct TraceBufferStats {
    /// Number of records currently in buffer.
    pub record_count: usize,
    /// Maximum buffer size.
    pub max_size: usize,
    /// Oldest firing in buffer.
    pub oldest_firing: Option<u64>,
    /// Newest firing in buffer.
    pub newest_firing: Option<u64>,
    /// Number of distinct firings.
    pub firing_count: usize,
    /// Count of each event type.
    pub event_counts: HashMap<&'static str, usize>,
}

// =============================================================================
// Tests
// =============================================================================
