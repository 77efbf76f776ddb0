//! Beta node descriptions and join evaluation.
//!
//! A beta node pairs the tuples arriving on its left input with the facts
//! arriving on its right input. Equality joins are turned into an index key
//! on both sides, so only tuples and facts with equal keys are ever tested
//! against each other; the remaining tests run per candidate pair.

use std::fmt;
use std::sync::Arc;

use thicket_foundation::{Error, Fact, KeywordId, Result, Value};

use super::tuple::TupleEntry;
use super::NodeId;
use crate::accumulate::{AccumulateFunction, AccumulateInput};
use crate::constraint::{CompareOp, JoinFn};
use crate::rule::Bindings;
use crate::working_memory::FactRegistry;

/// Hash key of one side of an equality join.
pub(crate) type IndexKey = Vec<Value>;

/// Where a variable's value lives in a rule's tuples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Declaration {
    /// Tuple slot (condition index).
    pub slot: usize,
    /// Field of the slot's fact; `None` means the slot value itself
    /// (the fact reference, or an accumulate result).
    pub field: Option<KeywordId>,
}

impl Declaration {
    /// Reads the variable's value from a tuple.
    ///
    /// # Errors
    /// Returns `InconsistentNetworkState` if the slot is missing or refers to
    /// a fact that is no longer in working memory.
    pub fn resolve(&self, entries: &[TupleEntry], facts: &FactRegistry) -> Result<Value> {
        let entry = entries
            .get(self.slot)
            .ok_or_else(|| Error::inconsistent(format!("tuple has no slot {}", self.slot)))?;
        match (entry, self.field) {
            (TupleEntry::Fact(h), None) => Ok(Value::Fact(*h)),
            (TupleEntry::Fact(h), Some(field)) => {
                let fact = facts
                    .fact(*h)
                    .ok_or_else(|| Error::inconsistent(format!("tuple refers to dead {h:?}")))?;
                Ok(fact.get_or_nil(field))
            }
            (TupleEntry::Accumulated(v), _) => Ok(v.clone()),
            (TupleEntry::Absent, _) => Ok(Value::Nil),
        }
    }
}

/// Where a beta node's left input comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeftSource {
    /// The session's empty root tuple.
    Root,
    /// Tuples produced by another node.
    Node(NodeId),
}

/// A non-indexed join test.
#[derive(Clone)]
pub enum JoinTest {
    /// `fact.field op left`
    Compare {
        /// Earlier variable.
        left: Declaration,
        /// Operator.
        op: CompareOp,
        /// Candidate fact field.
        field: KeywordId,
    },
    /// Opaque predicate over named variables and the candidate fact.
    Predicate {
        /// Predicate key.
        key: Arc<str>,
        /// Variables exposed to the predicate.
        vars: Vec<(String, Declaration)>,
        /// The test.
        func: Arc<JoinFn>,
    },
}

impl fmt::Debug for JoinTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { left, op, field } => write!(f, "Compare({field:?} {op} {left:?})"),
            Self::Predicate { key, vars, .. } => {
                let names: Vec<_> = vars.iter().map(|(n, _)| n.as_str()).collect();
                write!(f, "Predicate({key} {names:?})")
            }
        }
    }
}

/// Shared description of join, not, exists, and accumulate nodes.
#[derive(Debug)]
pub struct BetaNode {
    /// Left input.
    pub left: LeftSource,
    /// Node receiving this node's tuples.
    pub child: NodeId,
    /// Equality joins: left variable paired with right field.
    pub index: Vec<(Declaration, KeywordId)>,
    /// Remaining tests, evaluated on index-compatible pairs.
    pub tests: Vec<JoinTest>,
}

impl BetaNode {
    /// Index key of a left tuple.
    pub(crate) fn left_key(&self, entries: &[TupleEntry], facts: &FactRegistry) -> Result<IndexKey> {
        self.index
            .iter()
            .map(|(decl, _)| decl.resolve(entries, facts))
            .collect()
    }

    /// Index key of a right fact.
    pub(crate) fn right_key(&self, fact: &Fact) -> IndexKey {
        self.index
            .iter()
            .map(|(_, field)| fact.get_or_nil(*field))
            .collect()
    }

    /// Runs the non-indexed tests on a candidate pair.
    pub(crate) fn passes(&self, entries: &[TupleEntry], facts: &FactRegistry, fact: &Fact) -> Result<bool> {
        for test in &self.tests {
            let ok = match test {
                JoinTest::Compare { left, op, field } => {
                    op.apply(&fact.get_or_nil(*field), &left.resolve(entries, facts)?)
                }
                JoinTest::Predicate { vars, func, .. } => {
                    let mut bindings = Bindings::new();
                    for (name, decl) in vars {
                        bindings.set(name.clone(), decl.resolve(entries, facts)?);
                    }
                    func(&bindings, fact)
                }
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Accumulate node: a beta node plus the aggregation it maintains.
#[derive(Debug)]
pub struct AccumulateNode {
    /// Inputs and join tests.
    pub beta: BetaNode,
    /// Aggregation function.
    pub function: Arc<dyn AccumulateFunction>,
    /// Contribution of each matching fact.
    pub input: AccumulateInput,
    /// Test the result must pass to emit a tuple.
    pub result_test: Option<(CompareOp, Value)>,
}

impl AccumulateNode {
    /// Returns true if the result satisfies the optional test.
    #[must_use]
    pub fn accepts(&self, result: &Value) -> bool {
        self.result_test
            .as_ref()
            .is_none_or(|(op, value)| op.apply(result, value))
    }
}
