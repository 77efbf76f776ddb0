//! Trace record type.
//!
//! A record wraps one [`SessionEvent`] with the bookkeeping the tracer adds:
//! a record id, the firing it happened during, and a timestamp.

use thicket_engine::SessionEvent;
use thicket_foundation::FactHandle;

// =============================================================================
// Trace Record
// =============================================================================

/// A timestamped trace record.
#[derive(Clone, Debug)]
pub struct TraceRecord {
    /// Unique record ID within the tracer.
    pub id: u64,
    /// Number of rule firings started before this event (0 = before any firing).
    pub firing: u64,
    /// Timestamp in nanoseconds since the tracer was created.
    pub timestamp_ns: u64,
    /// The traced event.
    pub event: SessionEvent,
}

impl TraceRecord {
    /// Creates a new trace record.
    #[must_use]
    pub fn new(id: u64, firing: u64, timestamp_ns: u64, event: SessionEvent) -> Self {
        Self {
            id,
            firing,
            timestamp_ns,
            event,
        }
    }

    /// Returns the event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    /// Rule name, for agenda and firing events.
    #[must_use]
    pub fn rule(&self) -> Option<&str> {
        match &self.event {
            SessionEvent::ActivationCreated { rule, .. }
            | SessionEvent::ActivationCancelled { rule, .. }
            | SessionEvent::RuleFiring { rule, .. }
            | SessionEvent::RuleFired { rule, .. }
            | SessionEvent::RuleFailed { rule, .. } => Some(rule),
            _ => None,
        }
    }

    /// Fact handle, for working-memory and justification events.
    #[must_use]
    pub fn handle(&self) -> Option<FactHandle> {
        match &self.event {
            SessionEvent::FactInserted { handle, .. }
            | SessionEvent::FactUpdated { handle, .. }
            | SessionEvent::FactRetracted { handle, .. }
            | SessionEvent::JustificationAdded { handle, .. }
            | SessionEvent::JustificationRemoved { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    /// Returns true for working-memory changes.
    #[must_use]
    pub fn is_fact_event(&self) -> bool {
        matches!(
            self.event,
            SessionEvent::FactInserted { .. }
                | SessionEvent::FactUpdated { .. }
                | SessionEvent::FactRetracted { .. }
        )
    }

    /// Returns true for agenda and firing events.
    #[must_use]
    pub fn is_rule_event(&self) -> bool {
        self.rule().is_some()
    }

    /// Returns true for justification ledger changes.
    #[must_use]
    pub fn is_tms_event(&self) -> bool {
        matches!(
            self.event,
            SessionEvent::JustificationAdded { .. } | SessionEvent::JustificationRemoved { .. }
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
