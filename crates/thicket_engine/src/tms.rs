//! Truth maintenance.
//!
//! A justified (logically asserted) fact stays live only while at least one
//! of its justifications does. A justification names the facts it depends on
//! (its justifiers) and, when made by a rule, the activation that created it.
//! This module is a pure ledger: it tells the session which handles lost
//! their last justification, and the session performs the retractions.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use thicket_foundation::{Error, FactHandle, Result};

use crate::agenda::ActivationId;
use crate::network::RuleId;

/// Justification identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JustificationId(pub u64);

impl fmt::Debug for JustificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Justification({})", self.0)
    }
}

/// One reason for a justified fact to be believed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Justification {
    /// Identifier.
    pub id: JustificationId,
    /// The fact being justified.
    pub justified: FactHandle,
    /// Facts this justification depends on.
    pub justifiers: Vec<FactHandle>,
    /// Rule that asserted it, if any.
    pub rule: Option<RuleId>,
    /// Activation that owns it, if any.
    pub activation: Option<ActivationId>,
}

/// Belief state of a live handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BeliefState {
    /// Directly asserted; lives until explicitly retracted.
    Unjustified,
    /// Logically asserted; lives while any of these justifications does.
    Justified(Vec<JustificationId>),
}

/// Justification ledger of a session.
#[derive(Clone, Debug, Default)]
pub struct TruthMaintenance {
    justifications: BTreeMap<JustificationId, Justification>,
    beliefs: HashMap<FactHandle, BTreeSet<JustificationId>>,
    by_justifier: HashMap<FactHandle, BTreeSet<JustificationId>>,
    by_activation: HashMap<ActivationId, BTreeSet<JustificationId>>,
    next_id: u64,
}

impl TruthMaintenance {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the handle is a justified fact.
    #[must_use]
    pub fn is_justified(&self, handle: FactHandle) -> bool {
        self.beliefs.contains_key(&handle)
    }

    /// Belief state of a handle known to be live.
    #[must_use]
    pub fn belief_state(&self, handle: FactHandle) -> BeliefState {
        match self.beliefs.get(&handle) {
            Some(ids) => BeliefState::Justified(ids.iter().copied().collect()),
            None => BeliefState::Unjustified,
        }
    }

    /// Looks up a justification.
    #[must_use]
    pub fn get(&self, id: JustificationId) -> Option<&Justification> {
        self.justifications.get(&id)
    }

    /// Justifications of a handle.
    #[must_use]
    pub fn justifications_of(&self, handle: FactHandle) -> Vec<&Justification> {
        self.beliefs
            .get(&handle)
            .into_iter()
            .flatten()
            .filter_map(|id| self.justifications.get(id))
            .collect()
    }

    /// Justifications owned by an activation.
    #[must_use]
    pub fn owned_by(&self, activation: ActivationId) -> Vec<JustificationId> {
        self.by_activation
            .get(&activation)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every justification, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Justification> {
        self.justifications.values()
    }

    /// Number of justifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.justifications.len()
    }

    /// Returns true if the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.justifications.is_empty()
    }

    /// Id of the most recent justification.
    #[must_use]
    pub const fn last_id(&self) -> u64 {
        self.next_id
    }

    pub(crate) fn set_last_id(&mut self, id: u64) {
        self.next_id = id;
    }

    /// Records the first justification of a freshly inserted logical fact.
    pub fn justify_new(
        &mut self,
        handle: FactHandle,
        justifiers: Vec<FactHandle>,
        rule: Option<RuleId>,
        activation: Option<ActivationId>,
    ) -> JustificationId {
        self.beliefs.entry(handle).or_default();
        self.record(handle, justifiers, rule, activation)
    }

    /// Adds a justification to an already justified fact.
    ///
    /// An identical justification (same justifiers, rule, and activation) is
    /// not duplicated; its id is returned instead.
    ///
    /// # Errors
    /// Returns `InvalidJustification` if the handle is directly asserted, or
    /// if the justification would make the handle depend on itself.
    pub fn add_justification(
        &mut self,
        handle: FactHandle,
        justifiers: Vec<FactHandle>,
        rule: Option<RuleId>,
        activation: Option<ActivationId>,
    ) -> Result<JustificationId> {
        let Some(existing) = self.beliefs.get(&handle) else {
            return Err(Error::invalid_justification(
                handle,
                "cannot justify a directly asserted fact",
            ));
        };
        let duplicate = existing.iter().find(|id| {
            self.justifications.get(id).is_some_and(|j| {
                j.justifiers == justifiers && j.rule == rule && j.activation == activation
            })
        });
        if let Some(id) = duplicate {
            return Ok(*id);
        }
        if self.creates_cycle(handle, &justifiers) {
            return Err(Error::invalid_justification(
                handle,
                "justification would form a cycle",
            ));
        }
        Ok(self.record(handle, justifiers, rule, activation))
    }

    /// Returns true if `handle` (transitively) justifies any of `justifiers`.
    #[must_use]
    pub fn creates_cycle(&self, handle: FactHandle, justifiers: &[FactHandle]) -> bool {
        if justifiers.contains(&handle) {
            return true;
        }
        let targets: BTreeSet<_> = justifiers.iter().copied().collect();
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([handle]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            for id in self.by_justifier.get(&current).into_iter().flatten() {
                if let Some(j) = self.justifications.get(id) {
                    if targets.contains(&j.justified) {
                        return true;
                    }
                    queue.push_back(j.justified);
                }
            }
        }
        false
    }

    fn record(
        &mut self,
        handle: FactHandle,
        justifiers: Vec<FactHandle>,
        rule: Option<RuleId>,
        activation: Option<ActivationId>,
    ) -> JustificationId {
        self.next_id += 1;
        let id = JustificationId(self.next_id);
        self.restore(Justification {
            id,
            justified: handle,
            justifiers,
            rule,
            activation,
        });
        id
    }

    /// Reinstates a justification with its original id.
    pub(crate) fn restore(&mut self, justification: Justification) {
        let id = justification.id;
        self.beliefs.entry(justification.justified).or_default().insert(id);
        for justifier in &justification.justifiers {
            self.by_justifier.entry(*justifier).or_default().insert(id);
        }
        if let Some(activation) = justification.activation {
            self.by_activation.entry(activation).or_default().insert(id);
        }
        self.justifications.insert(id, justification);
    }

    /// Removes a justification of `handle` on request.
    ///
    /// Returns true if `handle` lost its last justification and must be retracted.
    ///
    /// # Errors
    /// Returns `InvalidJustification` if `handle` has no such justification.
    pub fn remove_justification(&mut self, handle: FactHandle, id: JustificationId) -> Result<bool> {
        if self.justifications.get(&id).is_none_or(|j| j.justified != handle) {
            return Err(Error::invalid_justification(
                handle,
                format!("no justification {id:?}"),
            ));
        }
        Ok(self.remove(id).is_some())
    }

    /// Removes a justification by id.
    ///
    /// Returns the justified handle if that was its last justification.
    pub fn remove(&mut self, id: JustificationId) -> Option<FactHandle> {
        let justification = self.justifications.remove(&id)?;
        for justifier in &justification.justifiers {
            if let Some(set) = self.by_justifier.get_mut(justifier) {
                set.remove(&id);
                if set.is_empty() {
                    self.by_justifier.remove(justifier);
                }
            }
        }
        if let Some(activation) = justification.activation {
            if let Some(set) = self.by_activation.get_mut(&activation) {
                set.remove(&id);
                if set.is_empty() {
                    self.by_activation.remove(&activation);
                }
            }
        }
        let handle = justification.justified;
        let set = self.beliefs.get_mut(&handle)?;
        set.remove(&id);
        set.is_empty().then_some(handle)
    }

    /// Drops everything about a retracted handle.
    ///
    /// Removes its own justifications and every justification it supported.
    /// Returns the handles that lost their last justification as a result.
    pub fn forget(&mut self, handle: FactHandle) -> Vec<FactHandle> {
        if let Some(own) = self.beliefs.remove(&handle) {
            for id in own {
                self.remove(id);
            }
        }
        let supported: Vec<_> = self
            .by_justifier
            .get(&handle)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        supported
            .into_iter()
            .filter_map(|id| self.remove(id))
            .filter(|h| *h != handle)
            .collect()
    }

    /// Justifications that name `handle` as a justifier, with the handle each supports.
    #[must_use]
    pub fn supported_by(&self, handle: FactHandle) -> Vec<(JustificationId, FactHandle)> {
        self.by_justifier
            .get(&handle)
            .into_iter()
            .flatten()
            .filter_map(|id| self.justifications.get(id).map(|j| (*id, j.justified)))
            .collect()
    }

    /// Moves ownership of an activation's justifications to another activation.
    pub fn transfer(&mut self, from: ActivationId, to: ActivationId) {
        let Some(ids) = self.by_activation.remove(&from) else {
            return;
        };
        for id in &ids {
            if let Some(j) = self.justifications.get_mut(id) {
                j.activation = Some(to);
            }
        }
        self.by_activation.entry(to).or_default().extend(ids);
    }
}
