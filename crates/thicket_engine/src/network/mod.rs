//! The compiled match network.
//!
//! A [`RuleBase`] is the immutable topology produced by a
//! [`RuleBaseBuilder`]: object-type roots, alpha nodes, beta nodes
//! (join/not/exists/accumulate) and one terminal node per rule. Node
//! *memories* are not stored here; every [`Session`](crate::Session) keeps its
//! own, so one rule base can back many sessions.
//!
//! ```text
//! (entry point, type) ──► ObjectType ──► Alpha ──► Alpha ──┬─► LeftInputAdapter ─► Join ─► Terminal
//!                                                          └─────────────────────► (right input)
//! ```

pub mod alpha;
pub mod beta;
pub mod builder;
pub mod memory;
pub(crate) mod propagate;
pub mod tuple;

use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use thicket_foundation::{EntryPointId, Error, FactTemplate, Interner, KeywordId, Result};

use crate::constraint::AlphaConstraint;
use crate::rule::Rule;

pub use alpha::ObjectTypeIndex;
pub use beta::{AccumulateNode, BetaNode, Declaration, JoinTest, LeftSource};
pub use builder::RuleBaseBuilder;

// =============================================================================
// Identifiers
// =============================================================================

/// Index of a node in the rule base.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    /// Child slot not yet linked during compilation.
    pub(crate) const UNLINKED: NodeId = NodeId(u32::MAX);

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Index of a rule in the rule base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RuleId(pub u32);

impl RuleId {
    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// A node of the match network.
#[derive(Debug)]
pub enum NodeKind {
    /// Root for one (entry point, object type) pair.
    ObjectType {
        /// Entry point facts arrive through.
        entry_point: EntryPointId,
        /// Object type routed here.
        object_type: KeywordId,
        /// Downstream nodes.
        children: Vec<NodeId>,
    },
    /// Single-fact test.
    Alpha {
        /// The test.
        constraint: AlphaConstraint,
        /// Downstream nodes (alpha nodes, adapters, or beta right inputs).
        children: Vec<NodeId>,
    },
    /// Turns facts into one-slot tuples for a rule's first pattern.
    LeftInputAdapter {
        /// Node receiving the tuples.
        child: NodeId,
    },
    /// Pairs tuples with facts.
    Join(BetaNode),
    /// Passes tuples with no matching fact.
    Not(BetaNode),
    /// Passes tuples with at least one matching fact.
    Exists(BetaNode),
    /// Extends tuples with an aggregate over matching facts.
    Accumulate(AccumulateNode),
    /// End of a rule's condition chain.
    Terminal {
        /// Rule activated by tuples reaching this node.
        rule: RuleId,
    },
}

impl NodeKind {
    /// Short name of the node type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::ObjectType { .. } => "object-type",
            Self::Alpha { .. } => "alpha",
            Self::LeftInputAdapter { .. } => "left-input-adapter",
            Self::Join(_) => "join",
            Self::Not(_) => "not",
            Self::Exists(_) => "exists",
            Self::Accumulate(_) => "accumulate",
            Self::Terminal { .. } => "terminal",
        }
    }

    /// Returns the beta description of join/not/exists/accumulate nodes.
    #[must_use]
    pub const fn beta(&self) -> Option<&BetaNode> {
        match self {
            Self::Join(b) | Self::Not(b) | Self::Exists(b) => Some(b),
            Self::Accumulate(a) => Some(&a.beta),
            _ => None,
        }
    }

    /// Downstream nodes.
    #[must_use]
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Self::ObjectType { children, .. } | Self::Alpha { children, .. } => children.clone(),
            Self::LeftInputAdapter { child } => vec![*child],
            Self::Join(b) | Self::Not(b) | Self::Exists(b) => vec![b.child],
            Self::Accumulate(a) => vec![a.beta.child],
            Self::Terminal { .. } => Vec::new(),
        }
    }
}

// =============================================================================
// Rule Base
// =============================================================================

/// A declared entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPointDecl {
    /// Entry point name.
    pub name: String,
    /// Facts inserted here are timestamped events.
    pub stream: bool,
}

/// A rule together with what compilation produced for it.
#[derive(Debug)]
pub struct CompiledRule {
    /// Rule id.
    pub id: RuleId,
    /// The source rule (name, attributes, action).
    pub rule: Rule,
    /// Where each exported variable lives in the rule's tuples.
    pub declarations: HashMap<String, Declaration>,
    /// Terminal node, `None` for disabled rules.
    pub terminal: Option<NodeId>,
}

/// Immutable compiled rule set, shared by sessions.
#[derive(Debug)]
pub struct RuleBase {
    pub(crate) entry_points: Vec<EntryPointDecl>,
    pub(crate) rules: Vec<CompiledRule>,
    pub(crate) nodes: Vec<NodeKind>,
    pub(crate) object_types: ObjectTypeIndex,
    pub(crate) root_consumers: Vec<NodeId>,
    pub(crate) templates: HashMap<KeywordId, FactTemplate>,
    pub(crate) interner: Interner,
}

impl RuleBase {
    /// Keyword interner used while building the rule base.
    #[must_use]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Looks up an entry point by name.
    #[must_use]
    pub fn entry_point(&self, name: &str) -> Option<EntryPointId> {
        self.entry_points
            .iter()
            .position(|ep| ep.name == name)
            .and_then(|i| u32::try_from(i).ok())
            .map(EntryPointId)
    }

    /// Name of an entry point.
    #[must_use]
    pub fn entry_point_name(&self, id: EntryPointId) -> Option<&str> {
        self.entry_points.get(id.index() as usize).map(|ep| ep.name.as_str())
    }

    /// All declared entry points, in id order.
    #[must_use]
    pub fn entry_points(&self) -> &[EntryPointDecl] {
        &self.entry_points
    }

    /// Returns true if the entry point exists.
    #[must_use]
    pub fn has_entry_point(&self, id: EntryPointId) -> bool {
        (id.index() as usize) < self.entry_points.len()
    }

    /// Returns true if facts inserted into the entry point are events.
    #[must_use]
    pub fn is_stream(&self, id: EntryPointId) -> bool {
        self.entry_points
            .get(id.index() as usize)
            .is_some_and(|ep| ep.stream)
    }

    /// Looks up a compiled rule.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> Option<&CompiledRule> {
        self.rules.get(id.index())
    }

    /// Looks up a rule id by name.
    #[must_use]
    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.rules.iter().find(|r| r.rule.name == name).map(|r| r.id)
    }

    /// All compiled rules, in id order.
    pub fn rules(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }

    /// Number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Looks up a node.
    ///
    /// # Errors
    /// Returns `InconsistentNetworkState` for an id outside the network.
    pub fn node(&self, id: NodeId) -> Result<&NodeKind> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| Error::inconsistent(format!("no such node {id:?}")))
    }

    /// All nodes with their ids.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeKind)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(u32::try_from(i).unwrap_or(u32::MAX)), n))
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Object-type root node for facts of `object_type` in `entry_point`.
    #[must_use]
    pub fn object_type_node(&self, entry_point: EntryPointId, object_type: KeywordId) -> Option<NodeId> {
        self.object_types.get(entry_point, object_type)
    }

    /// Template registered for an object type.
    #[must_use]
    pub fn template(&self, object_type: KeywordId) -> Option<&FactTemplate> {
        self.templates.get(&object_type)
    }
}
