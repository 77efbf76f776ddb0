//! Per-session node memories.
//!
//! Beta memories keep both sides of a join: left entries keyed by tuple and
//! right entries keyed by fact handle, each hash-indexed by the equality join
//! key computed when the entry was admitted. Removals use the stored key, so
//! they never need to re-read a fact whose value may already have changed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thicket_foundation::{Error, FactHandle, Result, Value};

use super::beta::IndexKey;
use super::tuple::TupleId;
use super::{NodeId, NodeKind, RuleBase};
use crate::accumulate::AccumulateState;

/// Sizes of one node's memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Left entries (tuples), or adapter tuples.
    pub left: usize,
    /// Right entries (facts).
    pub right: usize,
}

/// Per-tuple state of a left entry.
pub(crate) enum LeftState {
    /// Join: one child tuple per matching fact.
    Join {
        children: BTreeMap<FactHandle, TupleId>,
    },
    /// Not/exists: matching facts and the single child while the gate is open.
    Gate {
        matches: BTreeSet<FactHandle>,
        child: Option<TupleId>,
    },
    /// Accumulate: per-fact contributions, running state, current result.
    Accumulate {
        contributions: BTreeMap<FactHandle, Value>,
        state: Box<dyn AccumulateState>,
        result: Value,
        child: Option<TupleId>,
    },
}

pub(crate) struct LeftEntry {
    pub key: IndexKey,
    pub state: LeftState,
}

pub(crate) struct RightEntry {
    pub key: IndexKey,
    /// Left tuples this fact matched, with the join child tuple if any.
    pub partners: BTreeMap<TupleId, Option<TupleId>>,
}

/// Both sides of a beta node.
#[derive(Default)]
pub(crate) struct BetaMemory {
    pub left: BTreeMap<TupleId, LeftEntry>,
    left_index: HashMap<IndexKey, BTreeSet<TupleId>>,
    pub right: BTreeMap<FactHandle, RightEntry>,
    right_index: HashMap<IndexKey, BTreeSet<FactHandle>>,
}

impl BetaMemory {
    pub fn insert_left(&mut self, tuple: TupleId, entry: LeftEntry) -> Result<()> {
        self.left_index
            .entry(entry.key.clone())
            .or_default()
            .insert(tuple);
        if self.left.insert(tuple, entry).is_some() {
            return Err(Error::inconsistent(format!("{tuple:?} admitted twice")));
        }
        Ok(())
    }

    pub fn remove_left(&mut self, tuple: TupleId) -> Option<LeftEntry> {
        let entry = self.left.remove(&tuple)?;
        if let Some(bucket) = self.left_index.get_mut(&entry.key) {
            bucket.remove(&tuple);
            if bucket.is_empty() {
                self.left_index.remove(&entry.key);
            }
        }
        Some(entry)
    }

    pub fn insert_right(&mut self, handle: FactHandle, key: IndexKey) -> Result<()> {
        self.right_index.entry(key.clone()).or_default().insert(handle);
        let entry = RightEntry {
            key,
            partners: BTreeMap::new(),
        };
        if self.right.insert(handle, entry).is_some() {
            return Err(Error::inconsistent(format!("{handle:?} admitted twice")));
        }
        Ok(())
    }

    pub fn remove_right(&mut self, handle: FactHandle) -> Option<RightEntry> {
        let entry = self.right.remove(&handle)?;
        if let Some(bucket) = self.right_index.get_mut(&entry.key) {
            bucket.remove(&handle);
            if bucket.is_empty() {
                self.right_index.remove(&entry.key);
            }
        }
        Some(entry)
    }

    /// Left tuples whose key equals `key`.
    pub fn left_candidates(&self, key: &IndexKey) -> Vec<TupleId> {
        self.left_index
            .get(key)
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Right facts whose key equals `key`.
    pub fn right_candidates(&self, key: &IndexKey) -> Vec<FactHandle> {
        self.right_index
            .get(key)
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Mutable left entry, which must exist.
    pub fn left_mut(&mut self, tuple: TupleId) -> Result<&mut LeftEntry> {
        self.left
            .get_mut(&tuple)
            .ok_or_else(|| Error::inconsistent(format!("{tuple:?} missing from left memory")))
    }

    /// Records that `handle` matched `tuple`.
    pub fn link(&mut self, handle: FactHandle, tuple: TupleId, child: Option<TupleId>) {
        if let Some(right) = self.right.get_mut(&handle) {
            right.partners.insert(tuple, child);
        }
    }

    /// Forgets that `handle` matched `tuple`.
    pub fn unlink(&mut self, handle: FactHandle, tuple: TupleId) {
        if let Some(right) = self.right.get_mut(&handle) {
            right.partners.remove(&tuple);
        }
    }
}

/// Memory of one node.
pub(crate) enum NodeMemory {
    /// Object-type and terminal nodes keep nothing here.
    Stateless,
    /// Alpha nodes count evaluations.
    Alpha { evaluations: u64 },
    /// Adapter: fact handle to the one-slot tuple made for it.
    Adapter { tuples: BTreeMap<FactHandle, TupleId> },
    /// Join, not, exists, and accumulate nodes.
    Beta(BetaMemory),
}

/// All node memories of a session, indexed by node id.
pub(crate) struct NodeMemories {
    nodes: Vec<NodeMemory>,
}

impl NodeMemories {
    /// Empty memories shaped after a rule base.
    pub fn for_rule_base(rule_base: &RuleBase) -> Self {
        let nodes = rule_base
            .nodes
            .iter()
            .map(|node| match node {
                NodeKind::Alpha { .. } => NodeMemory::Alpha { evaluations: 0 },
                NodeKind::LeftInputAdapter { .. } => NodeMemory::Adapter {
                    tuples: BTreeMap::new(),
                },
                NodeKind::Join(_) | NodeKind::Not(_) | NodeKind::Exists(_) | NodeKind::Accumulate(_) => {
                    NodeMemory::Beta(BetaMemory::default())
                }
                NodeKind::ObjectType { .. } | NodeKind::Terminal { .. } => NodeMemory::Stateless,
            })
            .collect();
        Self { nodes }
    }

    pub fn get(&self, node: NodeId) -> Option<&NodeMemory> {
        self.nodes.get(node.index())
    }

    pub fn count_evaluation(&mut self, node: NodeId) {
        if let Some(NodeMemory::Alpha { evaluations }) = self.nodes.get_mut(node.index()) {
            *evaluations += 1;
        }
    }

    pub fn evaluations(&self, node: NodeId) -> Option<u64> {
        match self.nodes.get(node.index()) {
            Some(NodeMemory::Alpha { evaluations }) => Some(*evaluations),
            _ => None,
        }
    }

    pub fn adapter_mut(&mut self, node: NodeId) -> Result<&mut BTreeMap<FactHandle, TupleId>> {
        match self.nodes.get_mut(node.index()) {
            Some(NodeMemory::Adapter { tuples }) => Ok(tuples),
            _ => Err(Error::inconsistent(format!("{node:?} has no adapter memory"))),
        }
    }

    pub fn beta(&self, node: NodeId) -> Option<&BetaMemory> {
        match self.nodes.get(node.index()) {
            Some(NodeMemory::Beta(memory)) => Some(memory),
            _ => None,
        }
    }

    pub fn beta_mut(&mut self, node: NodeId) -> Result<&mut BetaMemory> {
        match self.nodes.get_mut(node.index()) {
            Some(NodeMemory::Beta(memory)) => Ok(memory),
            _ => Err(Error::inconsistent(format!("{node:?} has no beta memory"))),
        }
    }

    /// Memory sizes of one node.
    pub fn stats(&self, node: NodeId) -> MemoryStats {
        match self.nodes.get(node.index()) {
            Some(NodeMemory::Adapter { tuples }) => MemoryStats {
                left: tuples.len(),
                right: 0,
            },
            Some(NodeMemory::Beta(memory)) => MemoryStats {
                left: memory.left.len(),
                right: memory.right.len(),
            },
            _ => MemoryStats::default(),
        }
    }
}
