//! Object-type index and alpha node sharing.
//!
//! Every (entry point, object type) pair a rule mentions gets one
//! `ObjectType` root node. A pattern's alpha constraints become a chain of
//! alpha nodes below that root; at each step an existing child with an equal
//! constraint is reused, so rules with the same leading constraints share
//! nodes and each constraint is evaluated once per fact.

use std::collections::HashMap;

use thicket_foundation::{EntryPointId, KeywordId};

use super::{NodeId, NodeKind, RuleBase};
use crate::constraint::AlphaConstraint;
use crate::rule::Pattern;

/// Maps (entry point, object type) to the root node facts are routed to.
#[derive(Clone, Debug, Default)]
pub struct ObjectTypeIndex {
    roots: HashMap<(EntryPointId, KeywordId), NodeId>,
}

impl ObjectTypeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Root node for the pair, if any rule references it.
    #[must_use]
    pub fn get(&self, entry_point: EntryPointId, object_type: KeywordId) -> Option<NodeId> {
        self.roots.get(&(entry_point, object_type)).copied()
    }

    /// Registers a root node.
    pub fn insert(&mut self, entry_point: EntryPointId, object_type: KeywordId, node: NodeId) {
        self.roots.insert((entry_point, object_type), node);
    }

    /// Number of roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Returns true if no roots are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl RuleBase {
    /// Appends a node and returns its id.
    pub(crate) fn push_node(&mut self, node: NodeKind) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(node);
        id
    }

    /// Root node for the pair, created on first use.
    pub(crate) fn object_type_root(&mut self, entry_point: EntryPointId, object_type: KeywordId) -> NodeId {
        if let Some(id) = self.object_types.get(entry_point, object_type) {
            return id;
        }
        let id = self.push_node(NodeKind::ObjectType {
            entry_point,
            object_type,
            children: Vec::new(),
        });
        self.object_types.insert(entry_point, object_type, id);
        id
    }

    /// Adds `child` below an object-type or alpha node.
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(NodeKind::ObjectType { children, .. } | NodeKind::Alpha { children, .. }) =
            self.nodes.get_mut(parent.index())
        {
            children.push(child);
        }
    }

    /// Returns the alpha node testing `constraint` below `parent`, reusing an
    /// existing one when the constraints are equal.
    fn shared_alpha(&mut self, parent: NodeId, constraint: &AlphaConstraint) -> NodeId {
        let existing = match self.nodes.get(parent.index()) {
            Some(NodeKind::ObjectType { children, .. } | NodeKind::Alpha { children, .. }) => {
                children.iter().copied().find(|c| {
                    matches!(
                        self.nodes.get(c.index()),
                        Some(NodeKind::Alpha { constraint: other, .. }) if other == constraint
                    )
                })
            }
            _ => None,
        };
        if let Some(id) = existing {
            return id;
        }
        let id = self.push_node(NodeKind::Alpha {
            constraint: constraint.clone(),
            children: Vec::new(),
        });
        self.attach(parent, id);
        id
    }

    /// Builds (or reuses) the alpha chain for a pattern and returns its last node.
    pub(crate) fn alpha_chain(&mut self, pattern: &Pattern) -> NodeId {
        let mut current = self.object_type_root(pattern.entry_point, pattern.object_type);
        for constraint in &pattern.alpha {
            current = self.shared_alpha(current, constraint);
        }
        current
    }
}
