//! Trace output formatters.
//!
//! Provides human-readable and JSON formatters for trace records.

use std::fmt::Write;

use thicket_engine::SessionEvent;
use thicket_foundation::{Interner, KeywordId};

use super::record::TraceRecord;

// =============================================================================
// Trace Formatter Trait
// =============================================================================

/// Trait for formatting trace records.
pub trait TraceFormatter {
    /// Formats a single trace record to a string.
    fn format(&self, record: &TraceRecord, interner: &Interner) -> String;

    /// Formats multiple records.
    fn format_many(&self, records: &[&TraceRecord], interner: &Interner) -> String {
        records
            .iter()
            .map(|r| self.format(r, interner))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn type_name(id: KeywordId, interner: &Interner) -> &str {
    interner.get_keyword(id).unwrap_or("?")
}

// =============================================================================
// Human-Readable Formatter
// =============================================================================

/// Formats trace records in human-readable form.
#[derive(Clone, Debug, Default)]
pub struct HumanFormatter {
    /// Whether to include timestamps.
    pub show_timestamps: bool,
    /// Whether to include record IDs.
    pub show_ids: bool,
}

impl HumanFormatter {
    /// Creates a new human formatter with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to show timestamps.
    #[must_use]
    pub fn with_timestamps(mut self) -> Self {
        self.show_timestamps = true;
        self
    }

    /// Builder method to show record IDs.
    #[must_use]
    pub fn with_ids(mut self) -> Self {
        self.show_ids = true;
        self
    }

    /// Formats timestamp in microseconds.
    #[allow(clippy::cast_precision_loss)]
    fn format_timestamp(ns: u64) -> String {
        let us = ns / 1000;
        if us >= 1_000_000 {
            format!("{:.3}s", us as f64 / 1_000_000.0)
        } else if us >= 1000 {
            format!("{:.3}ms", us as f64 / 1000.0)
        } else {
            format!("{us}us")
        }
    }
}

impl TraceFormatter for HumanFormatter {
    fn format(&self, record: &TraceRecord, interner: &Interner) -> String {
        let mut prefix = String::new();

        if self.show_ids {
            let _ = write!(prefix, "[{:06}] ", record.id);
        }

        let _ = write!(prefix, "F{:04} ", record.firing);

        if self.show_timestamps {
            let _ = write!(
                prefix,
                "{:>10} ",
                Self::format_timestamp(record.timestamp_ns)
            );
        }

        let event_str = match &record.event {
            SessionEvent::FactInserted {
                handle,
                object_type,
                logical,
            } => {
                let kind = if *logical { "INSERT-LOGICAL" } else { "INSERT" };
                format!("  {kind} {handle} :{}", type_name(*object_type, interner))
            }
            SessionEvent::FactUpdated {
                handle,
                object_type,
            } => format!("  UPDATE {handle} :{}", type_name(*object_type, interner)),
            SessionEvent::FactRetracted {
                handle,
                object_type,
                cascaded,
            } => {
                let suffix = if *cascaded { " (unsupported)" } else { "" };
                format!(
                    "  RETRACT {handle} :{}{suffix}",
                    type_name(*object_type, interner)
                )
            }
            SessionEvent::ActivationCreated {
                activation,
                rule,
                salience,
            } => format!("  ACTIVATED {rule} {activation} salience={salience}"),
            SessionEvent::ActivationCancelled { activation, rule } => {
                format!("  CANCELLED {rule} {activation}")
            }
            SessionEvent::RuleFiring { activation, rule } => {
                format!("=== FIRING {rule} {activation} ===")
            }
            SessionEvent::RuleFired { activation, rule } => {
                format!("=== FIRED {rule} {activation} ===")
            }
            SessionEvent::RuleFailed {
                activation,
                rule,
                message,
            } => format!("=== FAILED {rule} {activation}: {message} ==="),
            SessionEvent::JustificationAdded {
                justification,
                handle,
            } => format!("    JUSTIFY {handle} by J{}", justification.0),
            SessionEvent::JustificationRemoved {
                justification,
                handle,
            } => format!("    UNJUSTIFY {handle} by J{}", justification.0),
        };

        format!("{prefix}{event_str}")
    }
}

// =============================================================================
// JSON Formatter
// =============================================================================

/// Formats trace records as JSON.
#[derive(Clone, Debug, Default)]
pub struct JsonFormatter {
    /// Whether to put each record of a batch on its own line.
    pub pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method for pretty printing.
    #[must_use]
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Escapes a string for JSON.
    fn escape_string(s: &str) -> String {
        s.replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }
}

impl TraceFormatter for JsonFormatter {
    fn format(&self, record: &TraceRecord, interner: &Interner) -> String {
        let event_data = match &record.event {
            SessionEvent::FactInserted {
                handle,
                object_type,
                logical,
            } => format!(
                "\"handle\":{},\"entry_point\":{},\"object_type\":\"{}\",\"logical\":{logical}",
                handle.id,
                handle.entry_point.0,
                Self::escape_string(type_name(*object_type, interner))
            ),
            SessionEvent::FactUpdated {
                handle,
                object_type,
            } => format!(
                "\"handle\":{},\"entry_point\":{},\"object_type\":\"{}\"",
                handle.id,
                handle.entry_point.0,
                Self::escape_string(type_name(*object_type, interner))
            ),
            SessionEvent::FactRetracted {
                handle,
                object_type,
                cascaded,
            } => format!(
                "\"handle\":{},\"entry_point\":{},\"object_type\":\"{}\",\"cascaded\":{cascaded}",
                handle.id,
                handle.entry_point.0,
                Self::escape_string(type_name(*object_type, interner))
            ),
            SessionEvent::ActivationCreated {
                activation,
                rule,
                salience,
            } => format!(
                "\"activation\":{},\"rule\":\"{}\",\"salience\":{salience}",
                activation.0,
                Self::escape_string(rule)
            ),
            SessionEvent::ActivationCancelled { activation, rule }
            | SessionEvent::RuleFiring { activation, rule }
            | SessionEvent::RuleFired { activation, rule } => format!(
                "\"activation\":{},\"rule\":\"{}\"",
                activation.0,
                Self::escape_string(rule)
            ),
            SessionEvent::RuleFailed {
                activation,
                rule,
                message,
            } => format!(
                "\"activation\":{},\"rule\":\"{}\",\"message\":\"{}\"",
                activation.0,
                Self::escape_string(rule),
                Self::escape_string(message)
            ),
            SessionEvent::JustificationAdded {
                justification,
                handle,
            }
            | SessionEvent::JustificationRemoved {
                justification,
                handle,
            } => format!(
                "\"justification\":{},\"handle\":{}",
                justification.0, handle.id
            ),
        };

        format!(
            "{{\"id\":{},\"firing\":{},\"timestamp_ns\":{},\"type\":\"{}\",{}}}",
            record.id,
            record.firing,
            record.timestamp_ns,
            record.event_type(),
            event_data
        )
    }

    fn format_many(&self, records: &[&TraceRecord], interner: &Interner) -> String {
        let items: Vec<_> = records.iter().map(|r| self.format(r, interner)).collect();
        if self.pretty {
            format!("[\n  {}\n]", items.join(",\n  "))
        } else {
            format!("[{}]", items.join(","))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
