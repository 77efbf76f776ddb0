//! Rule base, incremental match network, agenda, and truth maintenance for Thicket.
//!
//! This crate provides:
//! - [`RuleBaseBuilder`] / [`RuleBase`] - Compiles rules into a shared, immutable match network
//! - [`Session`] - Working memory, propagation, and the recognize-act loop
//! - [`Agenda`] - Salience-ordered activation queue
//! - [`TruthMaintenance`] - Justification ledger and cascading retraction
//! - [`AccumulateFunction`] - Incremental aggregation over matched facts
//! - [`SessionSnapshot`] - Persistable session state

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accumulate;
pub mod agenda;
pub mod config;
pub mod constraint;
pub mod event;
pub mod network;
pub mod rule;
pub mod session;
pub mod snapshot;
pub mod tms;
pub mod working_memory;

pub use accumulate::{
    AccumulateFunction, AccumulateInput, AccumulateState, Average, CollectList, Count, Max, Min,
    Sum,
};
pub use agenda::{Activation, ActivationId, ActivationStatus, Agenda};
pub use config::{ActionErrorPolicy, ClockType, EqualityMode, SessionConfig};
pub use constraint::{AlphaConstraint, AlphaPredicate, CompareOp, JoinConstraint, JoinPredicate};
pub use event::{SessionEvent, SessionListener};
pub use network::tuple::{TupleEntry, TupleId};
pub use network::{NodeId, NodeKind, RuleBase, RuleBaseBuilder, RuleId};
pub use rule::{Accumulate, Action, Bindings, Condition, Pattern, Rule};
pub use network::memory::MemoryStats;
pub use session::{FireSummary, RuleContext, Session};
pub use snapshot::{ActivationRecord, NodeContents, SessionSnapshot};
pub use tms::{BeliefState, Justification, JustificationId, TruthMaintenance};
pub use working_memory::{EventMetadata, FactRecord, FactRegistry, SessionClock};
