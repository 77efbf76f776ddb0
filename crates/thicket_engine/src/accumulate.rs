//! Incremental aggregation for accumulate conditions.
//!
//! An [`AccumulateFunction`] is a factory; the network creates one
//! [`AccumulateState`] per left tuple and feeds it each matching fact's input
//! value as facts arrive and leave. States must support `reverse` so a retract
//! can be applied without recomputing from scratch.
//!
//! A result must depend only on the set of contributing facts, never on the
//! order they arrived in: restoring a snapshot re-propagates facts in handle
//! order and expects to rebuild the same results.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use thicket_foundation::{Fact, FactHandle, KeywordId, LtVec, Value};

/// Running aggregation state for one left tuple.
pub trait AccumulateState: Send {
    /// Adds the contribution of a fact.
    fn accumulate(&mut self, handle: FactHandle, value: &Value);
    /// Removes the contribution of a fact previously added.
    fn reverse(&mut self, handle: FactHandle, value: &Value);
    /// Current result.
    fn result(&self) -> Value;
}

/// Factory for aggregation states.
pub trait AccumulateFunction: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;
    /// Creates an empty state.
    fn create(&self) -> Box<dyn AccumulateState>;
}

impl fmt::Debug for dyn AccumulateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccumulateFunction({})", self.name())
    }
}

/// What each matching fact contributes to the aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccumulateInput {
    /// The value of one field (nil when missing).
    Field(KeywordId),
    /// A reference to the fact itself.
    Fact,
}

impl AccumulateInput {
    /// Extracts the contribution of a fact.
    #[must_use]
    pub fn extract(self, handle: FactHandle, fact: &Fact) -> Value {
        match self {
            Self::Field(field) => fact.get_or_nil(field),
            Self::Fact => Value::Fact(handle),
        }
    }
}

// =============================================================================
// Count
// =============================================================================

/// Number of matching facts.
#[derive(Clone, Copy, Debug, Default)]
pub struct Count;

struct CountState(i64);

impl AccumulateState for CountState {
    fn accumulate(&mut self, _handle: FactHandle, _value: &Value) {
        self.0 += 1;
    }

    fn reverse(&mut self, _handle: FactHandle, _value: &Value) {
        self.0 -= 1;
    }

    fn result(&self) -> Value {
        Value::Int(self.0)
    }
}

impl AccumulateFunction for Count {
    fn name(&self) -> &'static str {
        "count"
    }

    fn create(&self) -> Box<dyn AccumulateState> {
        Box::new(CountState(0))
    }
}

// =============================================================================
// Sum / Average
// =============================================================================

/// Numeric total. Integers are summed incrementally and stay exact until a
/// float is seen; floats are kept per fact and summed in handle order, so
/// reversing a float leaves no rounding residue behind.
#[derive(Default)]
struct Total {
    ints: i64,
    floats: BTreeMap<FactHandle, f64>,
    count: usize,
}

impl Total {
    fn add(&mut self, handle: FactHandle, value: &Value) {
        match value {
            Value::Int(n) => {
                self.ints = self.ints.wrapping_add(*n);
                self.count += 1;
            }
            Value::Float(x) => {
                self.floats.insert(handle, *x);
                self.count += 1;
            }
            _ => {}
        }
    }

    fn remove(&mut self, handle: FactHandle, value: &Value) {
        match value {
            Value::Int(n) => {
                self.ints = self.ints.wrapping_sub(*n);
                self.count -= 1;
            }
            Value::Float(_) => {
                if self.floats.remove(&handle).is_some() {
                    self.count -= 1;
                }
            }
            _ => {}
        }
    }

    fn has_floats(&self) -> bool {
        !self.floats.is_empty()
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self) -> f64 {
        self.floats.values().fold(self.ints as f64, |total, x| total + x)
    }
}

/// Sum of numeric inputs. Non-numeric inputs are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sum;

struct SumState(Total);

impl AccumulateState for SumState {
    fn accumulate(&mut self, handle: FactHandle, value: &Value) {
        self.0.add(handle, value);
    }

    fn reverse(&mut self, handle: FactHandle, value: &Value) {
        self.0.remove(handle, value);
    }

    fn result(&self) -> Value {
        if self.0.has_floats() {
            Value::Float(self.0.as_f64())
        } else {
            Value::Int(self.0.ints)
        }
    }
}

impl AccumulateFunction for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn create(&self) -> Box<dyn AccumulateState> {
        Box::new(SumState(Total::default()))
    }
}

/// Mean of numeric inputs; nil when there are none.
#[derive(Clone, Copy, Debug, Default)]
pub struct Average;

struct AverageState(Total);

impl AccumulateState for AverageState {
    fn accumulate(&mut self, handle: FactHandle, value: &Value) {
        self.0.add(handle, value);
    }

    fn reverse(&mut self, handle: FactHandle, value: &Value) {
        self.0.remove(handle, value);
    }

    #[allow(clippy::cast_precision_loss)]
    fn result(&self) -> Value {
        if self.0.count == 0 {
            Value::Nil
        } else {
            Value::Float(self.0.as_f64() / self.0.count as f64)
        }
    }
}

impl AccumulateFunction for Average {
    fn name(&self) -> &'static str {
        "average"
    }

    fn create(&self) -> Box<dyn AccumulateState> {
        Box::new(AverageState(Total::default()))
    }
}

// =============================================================================
// Min / Max / Collect
// =============================================================================

/// Inputs keyed by the fact that contributed them, in handle order.
#[derive(Default)]
struct Members(BTreeMap<FactHandle, Value>);

impl Members {
    /// The most `wanted` non-nil input. Ties go to the oldest handle.
    fn extreme(&self, wanted: Ordering) -> Value {
        self.0
            .values()
            .filter(|v| !v.is_nil())
            .fold(None::<&Value>, |best, v| match best {
                Some(b) if v.partial_cmp(b) != Some(wanted) => Some(b),
                _ => Some(v),
            })
            .cloned()
            .unwrap_or(Value::Nil)
    }
}

/// Smallest input; nil when there are none.
#[derive(Clone, Copy, Debug, Default)]
pub struct Min;

/// Largest input; nil when there are none.
#[derive(Clone, Copy, Debug, Default)]
pub struct Max;

struct ExtremeState {
    members: Members,
    wanted: Ordering,
}

impl AccumulateState for ExtremeState {
    fn accumulate(&mut self, handle: FactHandle, value: &Value) {
        self.members.0.insert(handle, value.clone());
    }

    fn reverse(&mut self, handle: FactHandle, _value: &Value) {
        self.members.0.remove(&handle);
    }

    fn result(&self) -> Value {
        self.members.extreme(self.wanted)
    }
}

impl AccumulateFunction for Min {
    fn name(&self) -> &'static str {
        "min"
    }

    fn create(&self) -> Box<dyn AccumulateState> {
        Box::new(ExtremeState {
            members: Members::default(),
            wanted: Ordering::Less,
        })
    }
}

impl AccumulateFunction for Max {
    fn name(&self) -> &'static str {
        "max"
    }

    fn create(&self) -> Box<dyn AccumulateState> {
        Box::new(ExtremeState {
            members: Members::default(),
            wanted: Ordering::Greater,
        })
    }
}

/// All inputs as a vector, in handle order of the contributing facts.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollectList;

struct CollectState(Members);

impl AccumulateState for CollectState {
    fn accumulate(&mut self, handle: FactHandle, value: &Value) {
        self.0.0.insert(handle, value.clone());
    }

    fn reverse(&mut self, handle: FactHandle, _value: &Value) {
        self.0.0.remove(&handle);
    }

    fn result(&self) -> Value {
        Value::Vec(self.0.0.values().cloned().collect::<LtVec<Value>>())
    }
}

impl AccumulateFunction for CollectList {
    fn name(&self) -> &'static str {
        "collect-list"
    }

    fn create(&self) -> Box<dyn AccumulateState> {
        Box::new(CollectState(Members::default()))
    }
}
