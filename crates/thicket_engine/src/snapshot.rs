//! Session snapshots.
//!
//! A snapshot records what a session knows in plain data: live facts with
//! their handles, the justification ledger, the activations still bound to a
//! match, counters, and the contents of every stateful node memory.
//!
//! Restoring does not trust the recorded memories blindly. The network is
//! rebuilt by re-propagating the facts in handle order, the rebuilt matches
//! are paired with the recorded activations, and the rebuilt memories must
//! equal the recorded ones.

use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use thicket_foundation::{Error, FactHandle, Interner, Result};

use crate::agenda::{Activation, ActivationId, ActivationStatus};
use crate::config::SessionConfig;
use crate::network::memory::NodeMemory;
use crate::network::propagate::TerminalEvent;
use crate::network::tuple::{TupleEntry, TupleId};
use crate::network::{NodeId, RuleBase, RuleId};
use crate::session::Session;
use crate::tms::Justification;
use crate::working_memory::FactRecord;

/// An activation as recorded in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActivationRecord {
    /// Activation id.
    pub id: ActivationId,
    /// Rule name.
    pub rule: String,
    /// Tuple entries of the match.
    pub entries: Vec<TupleEntry>,
    /// Status at snapshot time.
    pub status: ActivationStatus,
}

/// Contents of one stateful node memory.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeContents {
    /// The node.
    pub node: NodeId,
    /// Left memory, as tuple entries.
    pub left: Vec<Vec<TupleEntry>>,
    /// Right memory, as handles in id order.
    pub right: Vec<FactHandle>,
}

impl NodeContents {
    /// Compares two contents, treating the left memories as multisets.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        fn counts(left: &[Vec<TupleEntry>]) -> HashMap<&[TupleEntry], usize> {
            let mut counts = HashMap::new();
            for entries in left {
                *counts.entry(entries.as_slice()).or_insert(0) += 1;
            }
            counts
        }
        self.node == other.node && self.right == other.right && counts(&self.left) == counts(&other.left)
    }
}

/// Persistable state of a session.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionSnapshot {
    /// Rule names in rule-base order; identifies the rule base.
    pub rules: Vec<String>,
    /// Session keyword table.
    pub interner: Interner,
    /// Id of the last allocated fact handle.
    pub last_fact_id: u64,
    /// Sequence of the last created activation.
    pub last_activation: u64,
    /// Id of the last recorded justification.
    pub last_justification: u64,
    /// Clock time in milliseconds.
    pub clock: u64,
    /// Whether the session was halted.
    pub halted: bool,
    /// Live facts in handle order.
    pub facts: Vec<FactRecord>,
    /// Justification ledger.
    pub justifications: Vec<Justification>,
    /// Activations still bound to a match, in creation order.
    pub activations: Vec<ActivationRecord>,
    /// Stateful node memories in node order.
    pub memories: Vec<NodeContents>,
}

impl SessionSnapshot {
    /// Number of live facts recorded.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }
}

impl Session {
    /// Captures the session state.
    ///
    /// # Errors
    /// Returns `InconsistentNetworkState` if a memory refers to a dead tuple.
    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        let mut activations = Vec::with_capacity(self.agenda.len());
        for activation in self.agenda.iter() {
            let rule = self
                .rule_base
                .rule(activation.rule)
                .ok_or_else(|| Error::inconsistent(format!("{:?} names unknown rule", activation.id)))?;
            activations.push(ActivationRecord {
                id: activation.id,
                rule: rule.rule.name.clone(),
                entries: self.arena.get(activation.tuple)?.entries.clone(),
                status: activation.status,
            });
        }
        Ok(SessionSnapshot {
            rules: self.rule_base.rules().map(|r| r.rule.name.clone()).collect(),
            interner: self.interner.clone(),
            last_fact_id: self.facts.last_id(),
            last_activation: self.agenda.last_sequence(),
            last_justification: self.tms.last_id(),
            clock: self.clock.now(),
            halted: self.halted,
            facts: self.facts.iter().cloned().collect(),
            justifications: self.tms.iter().cloned().collect(),
            activations,
            memories: self.node_contents()?,
        })
    }

    /// Contents of every stateful node memory, in node order.
    ///
    /// # Errors
    /// Returns `InconsistentNetworkState` if a memory refers to a dead tuple.
    pub fn node_contents(&self) -> Result<Vec<NodeContents>> {
        let mut contents = Vec::new();
        for (node, _) in self.rule_base.nodes() {
            match self.memories.get(node) {
                Some(NodeMemory::Adapter { tuples }) => {
                    let left = tuples
                        .values()
                        .map(|t| self.arena.get(*t).map(|t| t.entries.clone()))
                        .collect::<Result<_>>()?;
                    contents.push(NodeContents {
                        node,
                        left,
                        right: Vec::new(),
                    });
                }
                Some(NodeMemory::Beta(memory)) => {
                    let left = memory
                        .left
                        .keys()
                        .map(|t| self.arena.get(*t).map(|t| t.entries.clone()))
                        .collect::<Result<_>>()?;
                    contents.push(NodeContents {
                        node,
                        left,
                        right: memory.right.keys().copied().collect(),
                    });
                }
                _ => {}
            }
        }
        Ok(contents)
    }

    /// Rebuilds a session from a snapshot with the default configuration.
    ///
    /// # Errors
    /// See [`Session::restore_with_config`].
    pub fn restore(rule_base: Arc<RuleBase>, snapshot: SessionSnapshot) -> Result<Self> {
        Self::restore_with_config(rule_base, snapshot, SessionConfig::default())
    }

    /// Rebuilds a session from a snapshot.
    ///
    /// # Errors
    /// Returns `InconsistentNetworkState` if the snapshot was taken from a
    /// different rule base, if the rebuilt matches do not pair up with the
    /// recorded activations, or if the rebuilt memories differ from the
    /// recorded ones. Returns `UnknownEntryPoint` for a fact in an entry point
    /// the rule base does not declare.
    pub fn restore_with_config(
        rule_base: Arc<RuleBase>,
        snapshot: SessionSnapshot,
        config: SessionConfig,
    ) -> Result<Self> {
        let same_rules = rule_base.rule_count() == snapshot.rules.len()
            && rule_base.rules().zip(&snapshot.rules).all(|(r, name)| r.rule.name == *name);
        if !same_rules || !snapshot.interner.extends(rule_base.interner()) {
            return Err(Error::inconsistent("snapshot was taken from a different rule base"));
        }

        let mut session = Self::empty(rule_base, config);
        session.interner = snapshot.interner;
        session.clock.set(snapshot.clock);
        session.halted = snapshot.halted;
        for record in snapshot.facts {
            if !session.rule_base.has_entry_point(record.handle.entry_point) {
                return Err(Error::unknown_entry_point(record.handle.entry_point));
            }
            session.facts.insert(record)?;
        }
        session.facts.set_last_id(snapshot.last_fact_id);

        let mut matched = Vec::new();
        let events = session.propagate_root()?;
        session.collect_matches(events, &mut matched)?;
        let handles: Vec<FactHandle> = session.facts.iter().map(|r| r.handle).collect();
        for handle in handles {
            let events = session.propagate_assert(handle)?;
            session.collect_matches(events, &mut matched)?;
        }

        session.reconcile(matched, snapshot.activations)?;
        session.agenda.set_last_sequence(snapshot.last_activation);

        for justification in snapshot.justifications {
            let justified_ok = session.facts.get(justification.justified).is_some_and(|r| r.logical);
            let justifiers_ok = justification.justifiers.iter().all(|h| session.facts.is_live(*h));
            let owner_ok = justification
                .activation
                .is_none_or(|id| session.agenda.get(id).is_some());
            if !(justified_ok && justifiers_ok && owner_ok) {
                return Err(Error::inconsistent(format!(
                    "{:?} refers to state missing from the snapshot",
                    justification.id
                )));
            }
            session.tms.restore(justification);
        }
        session.tms.set_last_id(snapshot.last_justification);
        if let Some(record) = session
            .facts
            .iter()
            .find(|r| r.logical && !session.tms.is_justified(r.handle))
        {
            return Err(Error::inconsistent(format!(
                "{:?} is logical but has no justification",
                record.handle
            )));
        }

        let rebuilt = session.node_contents()?;
        let same_memories = rebuilt.len() == snapshot.memories.len()
            && rebuilt.iter().zip(&snapshot.memories).all(|(a, b)| a.same_as(b));
        if !same_memories {
            return Err(Error::inconsistent("rebuilt node memories differ from the snapshot"));
        }
        Ok(session)
    }

    /// Tracks complete matches while the network is rebuilt.
    fn collect_matches(&mut self, events: Vec<TerminalEvent>, matched: &mut Vec<(RuleId, TupleId)>) -> Result<()> {
        for event in events {
            match event {
                TerminalEvent::Matched { rule, tuple } => matched.push((rule, tuple)),
                TerminalEvent::Unmatched { tuple, .. } => {
                    let position = matched
                        .iter()
                        .position(|(_, t)| *t == tuple)
                        .ok_or_else(|| Error::inconsistent(format!("unmatched unknown {tuple:?}")))?;
                    matched.remove(position);
                    self.arena.release(tuple)?;
                }
            }
        }
        Ok(())
    }

    /// Pairs rebuilt matches with recorded activations.
    fn reconcile(&mut self, matched: Vec<(RuleId, TupleId)>, records: Vec<ActivationRecord>) -> Result<()> {
        let mut expected: HashMap<(RuleId, Vec<TupleEntry>), Vec<ActivationRecord>> = HashMap::new();
        for record in records {
            let rule = self.rule_base.rule_id(&record.rule).ok_or_else(|| {
                Error::inconsistent(format!("activation {} names unknown rule {}", record.id, record.rule))
            })?;
            expected
                .entry((rule, record.entries.clone()))
                .or_default()
                .push(record);
        }

        for (rule, tuple) in matched {
            let entries = self.arena.get(tuple)?.entries.clone();
            let record = expected
                .get_mut(&(rule, entries))
                .and_then(Vec::pop)
                .ok_or_else(|| Error::inconsistent(format!("rebuilt match of {rule:?} has no recorded activation")))?;
            let salience = self
                .rule_base
                .rule(rule)
                .map_or(0, |r| r.rule.salience);
            // An action that was running at snapshot time never completed.
            let status = match record.status {
                ActivationStatus::Firing => ActivationStatus::Pending,
                other => other,
            };
            self.agenda.insert(Activation {
                id: record.id,
                rule,
                tuple,
                salience,
                status,
            });
        }

        if expected.values().any(|left| !left.is_empty()) {
            return Err(Error::inconsistent("a recorded activation no longer matches"));
        }
        Ok(())
    }
}
