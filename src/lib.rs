//! Thicket - Forward-chaining inference engine
//!
//! This crate re-exports all layers of the Thicket system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: thicket_debug      — Session tracing
//! Layer 2: thicket_runtime    — Snapshot serialization
//! Layer 1: thicket_engine     — Match network, agenda, TMS, sessions
//! Layer 0: thicket_foundation — Core types (Value, Fact, FactHandle, Error)
//! ```

pub use thicket_debug as debug;
pub use thicket_engine as engine;
pub use thicket_foundation as foundation;
pub use thicket_runtime as runtime;
