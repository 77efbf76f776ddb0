//! Alpha and join constraints.
//!
//! Constraints are plain data so the network builder can compare them
//! structurally: two patterns whose leading alpha constraints are equal share
//! the same alpha nodes. Opaque predicates carry a caller-chosen key, and the
//! key alone decides whether two predicates are the same.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use thicket_foundation::{Fact, FieldExtractor, KeywordId, Value};

use crate::rule::Bindings;

// =============================================================================
// Comparison Operators
// =============================================================================

/// Comparison operator used by alpha and join constraints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Applies the operator to `left op right`.
    ///
    /// Values of incomparable types are unequal and never ordered.
    #[must_use]
    pub fn apply(self, left: &Value, right: &Value) -> bool {
        let ordering = left.partial_cmp(right);
        match self {
            Self::Eq => left == right || ordering == Some(Ordering::Equal),
            Self::Ne => !(left == right || ordering == Some(Ordering::Equal)),
            Self::Lt => ordering == Some(Ordering::Less),
            Self::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            Self::Gt => ordering == Some(Ordering::Greater),
            Self::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }

    /// Returns the operator symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// =============================================================================
// Alpha Constraints
// =============================================================================

/// Signature of an opaque single-fact test.
pub type AlphaFn = dyn Fn(&Fact) -> bool + Send + Sync;

/// An opaque single-fact test identified by its key.
#[derive(Clone)]
pub struct AlphaPredicate {
    /// Identity of the predicate. Equal keys are assumed to mean equal tests.
    pub key: Arc<str>,
    /// The test itself.
    pub func: Arc<AlphaFn>,
}

impl PartialEq for AlphaPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for AlphaPredicate {}

impl fmt::Debug for AlphaPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AlphaPredicate({})", self.key)
    }
}

/// A test on a single fact, evaluated by an alpha node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlphaConstraint {
    /// `field == value`
    FieldEquals {
        /// Field to read.
        field: KeywordId,
        /// Literal to compare against.
        value: Value,
    },
    /// `field op value`
    FieldCompare {
        /// Field to read.
        field: KeywordId,
        /// Operator.
        op: CompareOp,
        /// Literal to compare against.
        value: Value,
    },
    /// Field missing or nil.
    FieldIsNull {
        /// Field to read.
        field: KeywordId,
    },
    /// Field present and not nil.
    FieldNotNull {
        /// Field to read.
        field: KeywordId,
    },
    /// Opaque predicate.
    Predicate(AlphaPredicate),
}

impl AlphaConstraint {
    /// `field == value`
    #[must_use]
    pub fn equals(field: KeywordId, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field,
            value: value.into(),
        }
    }

    /// `field op value`
    #[must_use]
    pub fn compare(field: KeywordId, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::FieldCompare {
            field,
            op,
            value: value.into(),
        }
    }

    /// Field missing or nil.
    #[must_use]
    pub const fn is_null(field: KeywordId) -> Self {
        Self::FieldIsNull { field }
    }

    /// Field present and not nil.
    #[must_use]
    pub const fn not_null(field: KeywordId) -> Self {
        Self::FieldNotNull { field }
    }

    /// Opaque predicate identified by `key`.
    #[must_use]
    pub fn predicate<F>(key: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&Fact) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(AlphaPredicate {
            key: key.into(),
            func: Arc::new(func),
        })
    }

    /// Evaluates the constraint against a fact.
    #[must_use]
    pub fn matches(&self, fact: &Fact) -> bool {
        match self {
            Self::FieldEquals { field, value } => CompareOp::Eq.apply(&fact.get_or_nil(*field), value),
            Self::FieldCompare { field, op, value } => op.apply(&fact.get_or_nil(*field), value),
            Self::FieldIsNull { field } => FieldExtractor::new(*field).is_null(fact),
            Self::FieldNotNull { field } => !FieldExtractor::new(*field).is_null(fact),
            Self::Predicate(p) => (p.func)(fact),
        }
    }
}

// =============================================================================
// Join Constraints
// =============================================================================

/// Signature of an opaque test between earlier bindings and a candidate fact.
pub type JoinFn = dyn Fn(&Bindings, &Fact) -> bool + Send + Sync;

/// An opaque join test identified by its key.
#[derive(Clone)]
pub struct JoinPredicate {
    /// Identity of the predicate.
    pub key: Arc<str>,
    /// Variables the test reads; each must be bound by an earlier condition.
    pub vars: Vec<String>,
    /// The test itself.
    pub func: Arc<JoinFn>,
}

impl fmt::Debug for JoinPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JoinPredicate({} {:?})", self.key, self.vars)
    }
}

/// A test relating a candidate fact to variables bound by earlier conditions.
#[derive(Clone, Debug)]
pub enum JoinConstraint {
    /// `fact.field == ?var`. Equality joins are hash-indexed.
    Equals {
        /// Field of the candidate fact.
        field: KeywordId,
        /// Earlier variable.
        var: String,
    },
    /// `fact.field op ?var`
    Compare {
        /// Field of the candidate fact.
        field: KeywordId,
        /// Operator.
        op: CompareOp,
        /// Earlier variable.
        var: String,
    },
    /// Opaque test over the bindings of `vars` and the candidate fact.
    Predicate(JoinPredicate),
}

impl JoinConstraint {
    /// `fact.field == ?var`
    #[must_use]
    pub fn equals(field: KeywordId, var: impl Into<String>) -> Self {
        Self::Equals {
            field,
            var: var.into(),
        }
    }

    /// `fact.field op ?var`
    #[must_use]
    pub fn compare(field: KeywordId, op: CompareOp, var: impl Into<String>) -> Self {
        Self::Compare {
            field,
            op,
            var: var.into(),
        }
    }

    /// Opaque test reading `vars`, identified by `key`.
    #[must_use]
    pub fn predicate<F>(key: impl Into<Arc<str>>, vars: &[&str], func: F) -> Self
    where
        F: Fn(&Bindings, &Fact) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(JoinPredicate {
            key: key.into(),
            vars: vars.iter().map(|v| (*v).to_string()).collect(),
            func: Arc::new(func),
        })
    }

    /// Variables this constraint reads.
    pub fn variables(&self) -> Vec<&str> {
        match self {
            Self::Equals { var, .. } | Self::Compare { var, .. } => vec![var.as_str()],
            Self::Predicate(p) => p.vars.iter().map(String::as_str).collect(),
        }
    }
}
