//! Session tracing for Thicket.
//!
//! This crate provides:
//! - [`Tracer`] - A [`SessionListener`](thicket_engine::SessionListener) that
//!   records session events into a bounded buffer
//! - [`TraceBuffer`] - Ring buffer with queries by firing, rule, and handle
//! - [`HumanFormatter`] / [`JsonFormatter`] - Trace output formats

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod trace;

pub use trace::{
    HumanFormatter, JsonFormatter, TraceBuffer, TraceBufferStats, TraceFormatter, TraceOutput,
    TraceRecord, Tracer, TracerConfig,
};
