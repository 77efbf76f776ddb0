//! Rule definitions: patterns, conditions, bindings, and actions.
//!
//! Rules are built programmatically and handed to a
//! [`RuleBaseBuilder`](crate::RuleBaseBuilder), which compiles their
//! conditions into the match network.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thicket_foundation::{EntryPointId, FactHandle, KeywordId, Result, Value};

use crate::accumulate::{AccumulateFunction, AccumulateInput};
use crate::constraint::{AlphaConstraint, CompareOp, JoinConstraint};
use crate::session::RuleContext;

// =============================================================================
// Bindings
// =============================================================================

/// Variable bindings produced by a match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    values: HashMap<String, Value>,
}

impl Bindings {
    /// Create empty bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a binding by variable name.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.values.get(var)
    }

    /// Set a binding.
    pub fn set(&mut self, var: impl Into<String>, value: Value) {
        self.values.insert(var.into(), value);
    }

    /// Get the fact handle bound to a fact variable.
    #[must_use]
    pub fn get_fact(&self, var: &str) -> Option<FactHandle> {
        self.values.get(var).and_then(Value::as_fact)
    }

    /// Iterate all bindings.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert to a vector of values in deterministic (variable name) order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        keys.into_iter()
            .map(|k| self.values.get(k).cloned().unwrap_or(Value::Nil))
            .collect()
    }
}

// =============================================================================
// Patterns and Conditions
// =============================================================================

/// How a pattern exports a variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternBinding {
    /// Binds the matched fact's handle.
    Fact(String),
    /// Binds one field of the matched fact.
    Field {
        /// Variable name.
        var: String,
        /// Field to read.
        field: KeywordId,
    },
}

impl PatternBinding {
    /// The bound variable name.
    #[must_use]
    pub fn var(&self) -> &str {
        match self {
            Self::Fact(var) | Self::Field { var, .. } => var,
        }
    }
}

/// A match against one fact of a given object type.
#[derive(Clone, Debug)]
pub struct Pattern {
    /// Object type the fact must have.
    pub object_type: KeywordId,
    /// Entry point the fact must live in.
    pub entry_point: EntryPointId,
    /// Single-fact tests, evaluated in the alpha network in order.
    pub alpha: Vec<AlphaConstraint>,
    /// Tests against variables bound by earlier conditions.
    pub joins: Vec<JoinConstraint>,
    /// Variables exported to later conditions and the action.
    pub bindings: Vec<PatternBinding>,
}

impl Pattern {
    /// Creates a pattern on the default entry point.
    #[must_use]
    pub fn new(object_type: KeywordId) -> Self {
        Self {
            object_type,
            entry_point: EntryPointId::DEFAULT,
            alpha: Vec::new(),
            joins: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// Matches facts from another entry point.
    #[must_use]
    pub fn from_entry_point(mut self, entry_point: EntryPointId) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Adds a single-fact test.
    #[must_use]
    pub fn filter(mut self, constraint: AlphaConstraint) -> Self {
        self.alpha.push(constraint);
        self
    }

    /// Adds a test against earlier variables.
    #[must_use]
    pub fn join(mut self, constraint: JoinConstraint) -> Self {
        self.joins.push(constraint);
        self
    }

    /// Binds the matched fact to `var`.
    #[must_use]
    pub fn bind_fact(mut self, var: impl Into<String>) -> Self {
        self.bindings.push(PatternBinding::Fact(var.into()));
        self
    }

    /// Binds a field of the matched fact to `var`.
    ///
    /// If `var` is already bound by an earlier condition, this becomes an
    /// equality join instead (unification).
    #[must_use]
    pub fn bind_field(mut self, var: impl Into<String>, field: KeywordId) -> Self {
        self.bindings.push(PatternBinding::Field {
            var: var.into(),
            field,
        });
        self
    }
}

/// Aggregation over the facts matching a source pattern.
#[derive(Clone)]
pub struct Accumulate {
    /// Facts to aggregate. Its join constraints may read outer variables.
    pub source: Pattern,
    /// Aggregation function.
    pub function: Arc<dyn AccumulateFunction>,
    /// Contribution of each fact.
    pub input: AccumulateInput,
    /// Variable receiving the result.
    pub result_var: String,
    /// Optional test the result must pass for the condition to hold.
    pub result_test: Option<(CompareOp, Value)>,
}

impl Accumulate {
    /// Creates an accumulate condition.
    #[must_use]
    pub fn new(
        source: Pattern,
        function: impl AccumulateFunction + 'static,
        input: AccumulateInput,
        result_var: impl Into<String>,
    ) -> Self {
        Self {
            source,
            function: Arc::new(function),
            input,
            result_var: result_var.into(),
            result_test: None,
        }
    }

    /// Requires `result op value` to hold.
    #[must_use]
    pub fn with_test(mut self, op: CompareOp, value: impl Into<Value>) -> Self {
        self.result_test = Some((op, value.into()));
        self
    }
}

impl fmt::Debug for Accumulate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accumulate")
            .field("source", &self.source)
            .field("function", &self.function.name())
            .field("input", &self.input)
            .field("result_var", &self.result_var)
            .field("result_test", &self.result_test)
            .finish()
    }
}

/// One condition of a rule's left-hand side.
#[derive(Clone, Debug)]
pub enum Condition {
    /// A fact matching the pattern exists; its bindings are exported.
    Pattern(Pattern),
    /// No fact matches the pattern.
    Not(Pattern),
    /// At least one fact matches the pattern (matched once, no bindings).
    Exists(Pattern),
    /// Aggregation result over matching facts.
    Accumulate(Accumulate),
}

impl Condition {
    /// The pattern this condition matches facts against.
    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        match self {
            Self::Pattern(p) | Self::Not(p) | Self::Exists(p) => p,
            Self::Accumulate(acc) => &acc.source,
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// A rule action.
pub type Action = Arc<dyn Fn(&mut RuleContext<'_>) -> Result<()> + Send + Sync>;

/// A production rule: conditions plus an action.
#[derive(Clone)]
pub struct Rule {
    /// Unique rule name.
    pub name: String,
    /// Priority (higher fires first).
    pub salience: i32,
    /// Suppress activations of this rule created by its own action.
    pub no_loop: bool,
    /// Firing one activation of the group cancels the group's other pending activations.
    pub activation_group: Option<String>,
    /// Disabled rules are kept in the rule base but never compiled into the network.
    pub enabled: bool,
    /// Left-hand side.
    pub conditions: Vec<Condition>,
    /// Right-hand side.
    pub action: Action,
}

impl Rule {
    /// Creates an enabled rule with no conditions and a no-op action.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            salience: 0,
            no_loop: false,
            activation_group: None,
            enabled: true,
            conditions: Vec::new(),
            action: Arc::new(|_| Ok(())),
        }
    }

    /// Sets the salience (priority).
    #[must_use]
    pub fn salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }

    /// Sets the no-loop flag.
    #[must_use]
    pub fn no_loop(mut self, no_loop: bool) -> Self {
        self.no_loop = no_loop;
        self
    }

    /// Places the rule in an activation group.
    #[must_use]
    pub fn activation_group(mut self, group: impl Into<String>) -> Self {
        self.activation_group = Some(group.into());
        self
    }

    /// Enables or disables the rule.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Appends a condition.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the action.
    #[must_use]
    pub fn then<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut RuleContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.action = Arc::new(action);
        self
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("salience", &self.salience)
            .field("no_loop", &self.no_loop)
            .field("activation_group", &self.activation_group)
            .field("enabled", &self.enabled)
            .field("conditions", &self.conditions)
            .finish_non_exhaustive()
    }
}
