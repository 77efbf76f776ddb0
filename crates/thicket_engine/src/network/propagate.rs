//! Signal propagation through the network.
//!
//! All changes travel as [`Signal`]s through one FIFO queue and are
//! dispatched on the target node's kind. Facts enter at object-type roots;
//! tuples flow from adapters and beta nodes down to terminals. Terminals do
//! not touch the agenda directly: they report [`TerminalEvent`]s which the
//! session turns into activations once the queue has drained.
//!
//! Tuple ownership: whichever node receives a tuple on its left input (or the
//! terminal that reports it) is responsible for releasing it when the tuple is
//! retracted.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use thicket_foundation::{Error, Fact, FactHandle, Result};

use super::beta::BetaNode;
use super::memory::{LeftEntry, LeftState, NodeMemories};
use super::tuple::{Tuple, TupleArena, TupleEntry, TupleId};
use super::{AccumulateNode, NodeId, NodeKind, RuleBase, RuleId};
use crate::working_memory::FactRegistry;

/// A unit of propagation work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Signal {
    AssertFact { node: NodeId, handle: FactHandle },
    RetractFact { node: NodeId, handle: FactHandle },
    AssertTuple { node: NodeId, tuple: TupleId },
    RetractTuple { node: NodeId, tuple: TupleId },
}

/// What a terminal node observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TerminalEvent {
    /// A complete match for the rule appeared.
    Matched { rule: RuleId, tuple: TupleId },
    /// A complete match for the rule disappeared.
    Unmatched { rule: RuleId, tuple: TupleId },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Gate {
    Not,
    Exists,
}

impl Gate {
    const fn open(self, matches: usize) -> bool {
        match self {
            Self::Not => matches == 0,
            Self::Exists => matches > 0,
        }
    }
}

/// Allocates a tuple extending `parent` by one slot.
fn extend(arena: &mut TupleArena, parent: TupleId, entry: TupleEntry) -> Result<TupleId> {
    let mut entries = arena.get(parent)?.entries.clone();
    entries.push(entry);
    arena.alloc(Tuple { entries })
}

/// Drives signals through the network until the queue is empty.
pub(crate) struct Propagator<'a> {
    rule_base: &'a RuleBase,
    facts: &'a FactRegistry,
    memories: &'a mut NodeMemories,
    arena: &'a mut TupleArena,
    queue: VecDeque<Signal>,
    events: Vec<TerminalEvent>,
}

impl<'a> Propagator<'a> {
    pub fn new(
        rule_base: &'a RuleBase,
        facts: &'a FactRegistry,
        memories: &'a mut NodeMemories,
        arena: &'a mut TupleArena,
    ) -> Self {
        Self {
            rule_base,
            facts,
            memories,
            arena,
            queue: VecDeque::new(),
            events: Vec::new(),
        }
    }

    /// Queues a fact insertion at its object-type root.
    pub fn assert_fact(&mut self, handle: FactHandle, fact: &Fact) {
        if let Some(node) = self.rule_base.object_type_node(handle.entry_point, fact.object_type()) {
            self.queue.push_back(Signal::AssertFact { node, handle });
        }
    }

    /// Queues a fact removal at its object-type root.
    pub fn retract_fact(&mut self, handle: FactHandle, fact: &Fact) {
        if let Some(node) = self.rule_base.object_type_node(handle.entry_point, fact.object_type()) {
            self.queue.push_back(Signal::RetractFact { node, handle });
        }
    }

    /// Queues one empty root tuple per node fed by the root.
    pub fn assert_root(&mut self) -> Result<()> {
        for &node in &self.rule_base.root_consumers {
            let tuple = self.arena.alloc(Tuple { entries: Vec::new() })?;
            self.queue.push_back(Signal::AssertTuple { node, tuple });
        }
        Ok(())
    }

    /// Processes every queued signal and returns the terminal events in order.
    pub fn run(mut self) -> Result<Vec<TerminalEvent>> {
        while let Some(signal) = self.queue.pop_front() {
            self.dispatch(signal)?;
        }
        Ok(self.events)
    }

    fn fact(&self, handle: FactHandle) -> Result<&'a Fact> {
        let facts = self.facts;
        facts
            .fact(handle)
            .ok_or_else(|| Error::inconsistent(format!("propagating dead {handle:?}")))
    }

    fn dispatch(&mut self, signal: Signal) -> Result<()> {
        let rule_base = self.rule_base;
        match signal {
            Signal::AssertFact { node, handle } => match rule_base.node(node)? {
                NodeKind::ObjectType { children, .. } => {
                    for &child in children {
                        self.queue.push_back(Signal::AssertFact { node: child, handle });
                    }
                    Ok(())
                }
                NodeKind::Alpha { constraint, children } => {
                    let fact = self.fact(handle)?;
                    self.memories.count_evaluation(node);
                    if constraint.matches(fact) {
                        for &child in children {
                            self.queue.push_back(Signal::AssertFact { node: child, handle });
                        }
                    }
                    Ok(())
                }
                NodeKind::LeftInputAdapter { child } => {
                    let tuple = self.arena.alloc(Tuple { entries: vec![TupleEntry::Fact(handle)] })?;
                    if self.memories.adapter_mut(node)?.insert(handle, tuple).is_some() {
                        return Err(Error::inconsistent(format!("{handle:?} adapted twice")));
                    }
                    self.queue.push_back(Signal::AssertTuple { node: *child, tuple });
                    Ok(())
                }
                NodeKind::Join(beta) => self.join_right_assert(node, beta, handle),
                NodeKind::Not(beta) => self.gate_right_assert(node, beta, Gate::Not, handle),
                NodeKind::Exists(beta) => self.gate_right_assert(node, beta, Gate::Exists, handle),
                NodeKind::Accumulate(acc) => self.accumulate_right_assert(node, acc, handle),
                NodeKind::Terminal { .. } => Err(Error::inconsistent(format!(
                    "fact {handle:?} delivered to terminal {node:?}"
                ))),
            },
            Signal::RetractFact { node, handle } => match rule_base.node(node)? {
                NodeKind::ObjectType { children, .. } | NodeKind::Alpha { children, .. } => {
                    for &child in children {
                        self.queue.push_back(Signal::RetractFact { node: child, handle });
                    }
                    Ok(())
                }
                NodeKind::LeftInputAdapter { child } => {
                    if let Some(tuple) = self.memories.adapter_mut(node)?.remove(&handle) {
                        self.queue.push_back(Signal::RetractTuple { node: *child, tuple });
                    }
                    Ok(())
                }
                NodeKind::Join(beta) => self.join_right_retract(node, beta, handle),
                NodeKind::Not(beta) => self.gate_right_retract(node, beta, Gate::Not, handle),
                NodeKind::Exists(beta) => self.gate_right_retract(node, beta, Gate::Exists, handle),
                NodeKind::Accumulate(acc) => self.accumulate_right_retract(node, acc, handle),
                NodeKind::Terminal { .. } => Err(Error::inconsistent(format!(
                    "fact {handle:?} retracted at terminal {node:?}"
                ))),
            },
            Signal::AssertTuple { node, tuple } => match rule_base.node(node)? {
                NodeKind::Join(beta) => self.join_left_assert(node, beta, tuple),
                NodeKind::Not(beta) => self.gate_left_assert(node, beta, Gate::Not, tuple),
                NodeKind::Exists(beta) => self.gate_left_assert(node, beta, Gate::Exists, tuple),
                NodeKind::Accumulate(acc) => self.accumulate_left_assert(node, acc, tuple),
                NodeKind::Terminal { rule } => {
                    self.events.push(TerminalEvent::Matched { rule: *rule, tuple });
                    Ok(())
                }
                other => Err(Error::inconsistent(format!(
                    "tuple delivered to {} node {node:?}",
                    other.type_name()
                ))),
            },
            Signal::RetractTuple { node, tuple } => match rule_base.node(node)? {
                NodeKind::Join(beta) | NodeKind::Not(beta) | NodeKind::Exists(beta) => {
                    self.left_retract(node, beta, tuple)
                }
                NodeKind::Accumulate(acc) => self.left_retract(node, &acc.beta, tuple),
                NodeKind::Terminal { rule } => {
                    self.events.push(TerminalEvent::Unmatched { rule: *rule, tuple });
                    Ok(())
                }
                other => Err(Error::inconsistent(format!(
                    "tuple retracted at {} node {node:?}",
                    other.type_name()
                ))),
            },
        }
    }

    // =========================================================================
    // Join
    // =========================================================================

    fn join_right_assert(&mut self, node: NodeId, beta: &BetaNode, handle: FactHandle) -> Result<()> {
        let fact = self.fact(handle)?;
        let facts = self.facts;
        let key = beta.right_key(fact);
        let memory = self.memories.beta_mut(node)?;
        let candidates = memory.left_candidates(&key);
        memory.insert_right(handle, key)?;

        for tuple in candidates {
            if !beta.passes(&self.arena.get(tuple)?.entries, facts, fact)? {
                continue;
            }
            let child = extend(self.arena, tuple, TupleEntry::Fact(handle))?;
            if let LeftState::Join { children } = &mut memory.left_mut(tuple)?.state {
                children.insert(handle, child);
            }
            memory.link(handle, tuple, Some(child));
            self.queue.push_back(Signal::AssertTuple { node: beta.child, tuple: child });
        }
        Ok(())
    }

    fn join_left_assert(&mut self, node: NodeId, beta: &BetaNode, tuple: TupleId) -> Result<()> {
        let facts = self.facts;
        let entries = self.arena.get(tuple)?.entries.clone();
        let key = beta.left_key(&entries, facts)?;
        let memory = self.memories.beta_mut(node)?;
        let candidates = memory.right_candidates(&key);

        let mut children = BTreeMap::new();
        for handle in candidates {
            let fact = facts
                .fact(handle)
                .ok_or_else(|| Error::inconsistent(format!("right memory holds dead {handle:?}")))?;
            if !beta.passes(&entries, facts, fact)? {
                continue;
            }
            let child = extend(self.arena, tuple, TupleEntry::Fact(handle))?;
            children.insert(handle, child);
            memory.link(handle, tuple, Some(child));
            self.queue.push_back(Signal::AssertTuple { node: beta.child, tuple: child });
        }
        memory.insert_left(tuple, LeftEntry {
            key,
            state: LeftState::Join { children },
        })
    }

    fn join_right_retract(&mut self, node: NodeId, beta: &BetaNode, handle: FactHandle) -> Result<()> {
        let memory = self.memories.beta_mut(node)?;
        let Some(entry) = memory.remove_right(handle) else {
            return Ok(());
        };
        for (tuple, child) in entry.partners {
            if let LeftState::Join { children } = &mut memory.left_mut(tuple)?.state {
                children.remove(&handle);
            }
            if let Some(child) = child {
                self.queue.push_back(Signal::RetractTuple { node: beta.child, tuple: child });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Not / Exists
    // =========================================================================

    fn gate_right_assert(&mut self, node: NodeId, beta: &BetaNode, gate: Gate, handle: FactHandle) -> Result<()> {
        let fact = self.fact(handle)?;
        let facts = self.facts;
        let key = beta.right_key(fact);
        let memory = self.memories.beta_mut(node)?;
        let candidates = memory.left_candidates(&key);
        memory.insert_right(handle, key)?;

        for tuple in candidates {
            if !beta.passes(&self.arena.get(tuple)?.entries, facts, fact)? {
                continue;
            }
            memory.link(handle, tuple, None);
            let LeftState::Gate { matches, child } = &mut memory.left_mut(tuple)?.state else {
                return Err(Error::inconsistent(format!("{node:?} is not a gate")));
            };
            matches.insert(handle);
            if matches.len() != 1 {
                continue;
            }
            // The match count crossed zero.
            match gate {
                Gate::Not => {
                    if let Some(old) = child.take() {
                        self.queue.push_back(Signal::RetractTuple { node: beta.child, tuple: old });
                    }
                }
                Gate::Exists => {
                    let new = extend(self.arena, tuple, TupleEntry::Absent)?;
                    *child = Some(new);
                    self.queue.push_back(Signal::AssertTuple { node: beta.child, tuple: new });
                }
            }
        }
        Ok(())
    }

    fn gate_right_retract(&mut self, node: NodeId, beta: &BetaNode, gate: Gate, handle: FactHandle) -> Result<()> {
        let memory = self.memories.beta_mut(node)?;
        let Some(entry) = memory.remove_right(handle) else {
            return Ok(());
        };
        for tuple in entry.partners.into_keys() {
            let LeftState::Gate { matches, child } = &mut memory.left_mut(tuple)?.state else {
                return Err(Error::inconsistent(format!("{node:?} is not a gate")));
            };
            matches.remove(&handle);
            if !matches.is_empty() {
                continue;
            }
            match gate {
                Gate::Not => {
                    let new = extend(self.arena, tuple, TupleEntry::Absent)?;
                    *child = Some(new);
                    self.queue.push_back(Signal::AssertTuple { node: beta.child, tuple: new });
                }
                Gate::Exists => {
                    if let Some(old) = child.take() {
                        self.queue.push_back(Signal::RetractTuple { node: beta.child, tuple: old });
                    }
                }
            }
        }
        Ok(())
    }

    fn gate_left_assert(&mut self, node: NodeId, beta: &BetaNode, gate: Gate, tuple: TupleId) -> Result<()> {
        let facts = self.facts;
        let entries = self.arena.get(tuple)?.entries.clone();
        let key = beta.left_key(&entries, facts)?;
        let memory = self.memories.beta_mut(node)?;

        let mut matches = BTreeSet::new();
        for handle in memory.right_candidates(&key) {
            let fact = facts
                .fact(handle)
                .ok_or_else(|| Error::inconsistent(format!("right memory holds dead {handle:?}")))?;
            if beta.passes(&entries, facts, fact)? {
                matches.insert(handle);
                memory.link(handle, tuple, None);
            }
        }

        let child = if gate.open(matches.len()) {
            let new = extend(self.arena, tuple, TupleEntry::Absent)?;
            self.queue.push_back(Signal::AssertTuple { node: beta.child, tuple: new });
            Some(new)
        } else {
            None
        };
        memory.insert_left(tuple, LeftEntry {
            key,
            state: LeftState::Gate { matches, child },
        })
    }

    // =========================================================================
    // Accumulate
    // =========================================================================

    fn accumulate_right_assert(&mut self, node: NodeId, acc: &AccumulateNode, handle: FactHandle) -> Result<()> {
        let fact = self.fact(handle)?;
        let facts = self.facts;
        let beta = &acc.beta;
        let key = beta.right_key(fact);
        let value = acc.input.extract(handle, fact);
        let memory = self.memories.beta_mut(node)?;
        let candidates = memory.left_candidates(&key);
        memory.insert_right(handle, key)?;

        for tuple in candidates {
            if !beta.passes(&self.arena.get(tuple)?.entries, facts, fact)? {
                continue;
            }
            memory.link(handle, tuple, None);
            let LeftState::Accumulate {
                contributions,
                state,
                result,
                child,
            } = &mut memory.left_mut(tuple)?.state
            else {
                return Err(Error::inconsistent(format!("{node:?} is not an accumulator")));
            };
            state.accumulate(handle, &value);
            contributions.insert(handle, value.clone());
            let updated = state.result();
            if updated == *result {
                continue;
            }
            *result = updated;
            if let Some(old) = child.take() {
                self.queue.push_back(Signal::RetractTuple { node: beta.child, tuple: old });
            }
            if acc.accepts(result) {
                let new = extend(self.arena, tuple, TupleEntry::Accumulated(result.clone()))?;
                *child = Some(new);
                self.queue.push_back(Signal::AssertTuple { node: beta.child, tuple: new });
            }
        }
        Ok(())
    }

    fn accumulate_right_retract(&mut self, node: NodeId, acc: &AccumulateNode, handle: FactHandle) -> Result<()> {
        let beta = &acc.beta;
        let memory = self.memories.beta_mut(node)?;
        let Some(entry) = memory.remove_right(handle) else {
            return Ok(());
        };
        for tuple in entry.partners.into_keys() {
            let LeftState::Accumulate {
                contributions,
                state,
                result,
                child,
            } = &mut memory.left_mut(tuple)?.state
            else {
                return Err(Error::inconsistent(format!("{node:?} is not an accumulator")));
            };
            let Some(value) = contributions.remove(&handle) else {
                return Err(Error::inconsistent(format!(
                    "{handle:?} linked without a contribution at {node:?}"
                )));
            };
            state.reverse(handle, &value);
            let updated = state.result();
            if updated == *result {
                continue;
            }
            *result = updated;
            if let Some(old) = child.take() {
                self.queue.push_back(Signal::RetractTuple { node: beta.child, tuple: old });
            }
            if acc.accepts(result) {
                let new = extend(self.arena, tuple, TupleEntry::Accumulated(result.clone()))?;
                *child = Some(new);
                self.queue.push_back(Signal::AssertTuple { node: beta.child, tuple: new });
            }
        }
        Ok(())
    }

    fn accumulate_left_assert(&mut self, node: NodeId, acc: &AccumulateNode, tuple: TupleId) -> Result<()> {
        let facts = self.facts;
        let beta = &acc.beta;
        let entries = self.arena.get(tuple)?.entries.clone();
        let key = beta.left_key(&entries, facts)?;
        let memory = self.memories.beta_mut(node)?;

        let mut state = acc.function.create();
        let mut contributions = BTreeMap::new();
        for handle in memory.right_candidates(&key) {
            let fact = facts
                .fact(handle)
                .ok_or_else(|| Error::inconsistent(format!("right memory holds dead {handle:?}")))?;
            if !beta.passes(&entries, facts, fact)? {
                continue;
            }
            let value = acc.input.extract(handle, fact);
            state.accumulate(handle, &value);
            contributions.insert(handle, value);
            memory.link(handle, tuple, None);
        }

        let result = state.result();
        let child = if acc.accepts(&result) {
            let new = extend(self.arena, tuple, TupleEntry::Accumulated(result.clone()))?;
            self.queue.push_back(Signal::AssertTuple { node: beta.child, tuple: new });
            Some(new)
        } else {
            None
        };
        memory.insert_left(tuple, LeftEntry {
            key,
            state: LeftState::Accumulate {
                contributions,
                state,
                result,
                child,
            },
        })
    }

    // =========================================================================
    // Left retraction (all beta kinds)
    // =========================================================================

    fn left_retract(&mut self, node: NodeId, beta: &BetaNode, tuple: TupleId) -> Result<()> {
        let memory = self.memories.beta_mut(node)?;
        let entry = memory
            .remove_left(tuple)
            .ok_or_else(|| Error::inconsistent(format!("retract of unknown {tuple:?} at {node:?}")))?;

        match entry.state {
            LeftState::Join { children } => {
                for (handle, child) in children {
                    memory.unlink(handle, tuple);
                    self.queue.push_back(Signal::RetractTuple { node: beta.child, tuple: child });
                }
            }
            LeftState::Gate { matches, child } => {
                for handle in matches {
                    memory.unlink(handle, tuple);
                }
                if let Some(child) = child {
                    self.queue.push_back(Signal::RetractTuple { node: beta.child, tuple: child });
                }
            }
            LeftState::Accumulate {
                contributions, child, ..
            } => {
                for handle in contributions.into_keys() {
                    memory.unlink(handle, tuple);
                }
                if let Some(child) = child {
                    self.queue.push_back(Signal::RetractTuple { node: beta.child, tuple: child });
                }
            }
        }
        self.arena.release(tuple)?;
        Ok(())
    }
}
