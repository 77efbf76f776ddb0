//! Tracing of session execution.
//!
//! A [`Tracer`] is a [`SessionListener`]: register it on a session and it
//! records every working-memory, agenda, and TMS event. Recording costs one
//! branch when the tracer is disabled.
//!
//! # Example
//!
//! ```text
//! let tracer = Arc::new(Mutex::new(Tracer::new(TracerConfig::new().enabled())));
//! session.add_listener(Arc::clone(&tracer));
//! session.fire_all_rules()?;
//! let fired = tracer.lock()?.buffer().by_event_type("rule-fired").len();
//! ```

pub mod buffer;
pub mod format;
pub mod record;

pub use buffer::{TraceBuffer, TraceBufferStats};
pub use format::{HumanFormatter, JsonFormatter, TraceFormatter};
pub use record::TraceRecord;

use std::time::Instant;

use thicket_engine::{SessionEvent, SessionListener};
use thicket_foundation::Interner;

// =============================================================================
// Trace Output
// =============================================================================

/// Where trace output should be sent.
#[derive(Clone, Debug, Default)]
pub enum TraceOutput {
    /// No output (traces still recorded in buffer).
    #[default]
    None,
    /// Write each record to stderr as it is recorded.
    Stderr,
}

// =============================================================================
// Tracer Configuration
// =============================================================================

/// Configuration for the tracer.
#[derive(Clone, Debug)]
pub struct TracerConfig {
    /// Whether tracing is enabled.
    pub enabled: bool,
    /// Maximum records to keep in buffer.
    pub buffer_size: usize,
    /// Where to output traces.
    pub output: TraceOutput,
    /// Whether to use JSON format.
    pub json_format: bool,
    /// Filter for specific event types (empty = all).
    pub event_filter: Vec<String>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_size: 10000,
            output: TraceOutput::None,
            json_format: false,
            event_filter: Vec::new(),
        }
    }
}

impl TracerConfig {
    /// Creates a new tracer configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to enable tracing.
    #[must_use]
    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Builder method to set buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Builder method to output to stderr.
    #[must_use]
    pub fn to_stderr(mut self) -> Self {
        self.output = TraceOutput::Stderr;
        self
    }

    /// Builder method to use JSON format.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json_format = true;
        self
    }

    /// Builder method to filter event types.
    #[must_use]
    pub fn filter_events(mut self, types: Vec<String>) -> Self {
        self.event_filter = types;
        self
    }
}

// =============================================================================
// Tracer
// =============================================================================

/// Records session events.
///
/// Events are tagged with the number of rule firings started so far, so a
/// trace can be sliced per firing.
pub struct Tracer {
    config: TracerConfig,
    buffer: TraceBuffer,
    current_firing: u64,
    start_time: Instant,
    interner: Interner,
    human_formatter: HumanFormatter,
    json_formatter: JsonFormatter,
}

impl Tracer {
    /// Creates a new tracer with the given configuration.
    #[must_use]
    pub fn new(config: TracerConfig) -> Self {
        let buffer_size = config.buffer_size;
        Self {
            config,
            buffer: TraceBuffer::new(buffer_size),
            current_firing: 0,
            start_time: Instant::now(),
            interner: Interner::new(),
            human_formatter: HumanFormatter::new().with_timestamps(),
            json_formatter: JsonFormatter::new(),
        }
    }

    /// Creates a tracer with default configuration (disabled).
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(TracerConfig::default())
    }

    /// Creates an enabled tracer that outputs to stderr.
    #[must_use]
    pub fn to_stderr() -> Self {
        Self::new(TracerConfig::new().enabled().to_stderr())
    }

    /// Uses `interner` to name object types in stderr output.
    ///
    /// Pass a clone of the session's interner.
    #[must_use]
    pub fn with_interner(mut self, interner: Interner) -> Self {
        self.interner = interner;
        self
    }

    /// Returns whether tracing is enabled.
    #[must_use]
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Enables tracing.
    pub fn enable(&mut self) {
        self.config.enabled = true;
    }

    /// Disables tracing.
    pub fn disable(&mut self) {
        self.config.enabled = false;
    }

    /// Returns the number of rule firings seen so far.
    #[must_use]
    pub fn current_firing(&self) -> u64 {
        self.current_firing
    }

    /// Sets whether to use JSON output format.
    pub fn set_json_format(&mut self, json: bool) {
        self.config.json_format = json;
    }

    /// Sets the trace output destination.
    pub fn set_output(&mut self, output: TraceOutput) {
        self.config.output = output;
    }

    /// Records a session event.
    ///
    /// Returns immediately when tracing is disabled.
    #[inline]
    pub fn record(&mut self, event: &SessionEvent) {
        if !self.config.enabled {
            return;
        }

        self.record_internal(event);
    }

    fn record_internal(&mut self, event: &SessionEvent) {
        if matches!(event, SessionEvent::RuleFiring { .. }) {
            self.current_firing += 1;
        }

        if !self.config.event_filter.is_empty()
            && !self
                .config
                .event_filter
                .iter()
                .any(|t| t == event.event_type())
        {
            return;
        }

        #[allow(clippy::cast_possible_truncation)]
        let timestamp_ns = self.start_time.elapsed().as_nanos() as u64;
        self.buffer
            .push(self.current_firing, timestamp_ns, event.clone());

        if let TraceOutput::Stderr = self.config.output {
            if let Some(record) = self.buffer.recent(1).first() {
                let line = self.format_record(record, &self.interner);
                eprintln!("{line}");
            }
        }
    }

    /// Formats a record using the current format settings.
    #[must_use]
    pub fn format_record(&self, record: &TraceRecord, interner: &Interner) -> String {
        if self.config.json_format {
            self.json_formatter.format(record, interner)
        } else {
            self.human_formatter.format(record, interner)
        }
    }

    /// Formats multiple records.
    #[must_use]
    pub fn format_records(&self, records: &[&TraceRecord], interner: &Interner) -> String {
        if self.config.json_format {
            self.json_formatter.format_many(records, interner)
        } else {
            self.human_formatter.format_many(records, interner)
        }
    }

    /// Returns the trace buffer.
    #[must_use]
    pub fn buffer(&self) -> &TraceBuffer {
        &self.buffer
    }

    /// Clears the trace buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Returns buffer statistics.
    #[must_use]
    pub fn stats(&self) -> TraceBufferStats {
        self.buffer.stats()
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl SessionListener for Tracer {
    fn on_event(&mut self, event: &SessionEvent) {
        self.record(event);
    }
}

// =============================================================================
// Tests
// =============================================================================
