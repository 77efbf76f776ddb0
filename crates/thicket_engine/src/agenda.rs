//! The agenda: activations waiting to fire.
//!
//! Pending activations are ordered by descending salience, then by ascending
//! creation sequence, so equal-salience activations fire in the order they
//! were created. The agenda also remembers every activation still bound to a
//! live terminal tuple (fired, failed, or suppressed ones included) so that
//! retracting the tuple can find and unwind it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::network::tuple::TupleId;
use crate::network::RuleId;

/// Activation identifier; also its creation sequence number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActivationId(pub u64);

impl fmt::Debug for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Activation({})", self.0)
    }
}

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ActivationStatus {
    /// Waiting on the agenda.
    Pending,
    /// Its action is running.
    Firing,
    /// Its action completed.
    Fired,
    /// Will never fire (retracted, suppressed by no-loop, or cancelled by its group).
    Cancelled,
    /// Its action returned an error.
    Failed,
}

/// A rule match scheduled (or once scheduled) to fire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activation {
    /// Identifier and creation sequence.
    pub id: ActivationId,
    /// Rule to fire.
    pub rule: RuleId,
    /// Terminal tuple this activation was built from.
    pub tuple: TupleId,
    /// Salience of the rule at creation.
    pub salience: i32,
    /// Current status.
    pub status: ActivationStatus,
}

/// Salience-ordered activation queue.
#[derive(Debug, Default)]
pub struct Agenda {
    activations: BTreeMap<ActivationId, Activation>,
    queue: BTreeSet<(Reverse<i32>, ActivationId)>,
    by_tuple: HashMap<TupleId, ActivationId>,
    next_id: u64,
}

impl Agenda {
    /// Creates an empty agenda.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an activation for a new terminal tuple.
    ///
    /// `suppressed` activations are recorded as cancelled and never queued.
    pub fn create(&mut self, rule: RuleId, tuple: TupleId, salience: i32, suppressed: bool) -> ActivationId {
        self.next_id += 1;
        let id = ActivationId(self.next_id);
        let status = if suppressed {
            ActivationStatus::Cancelled
        } else {
            ActivationStatus::Pending
        };
        self.insert(Activation {
            id,
            rule,
            tuple,
            salience,
            status,
        });
        id
    }

    /// Inserts a fully formed activation (used when restoring a snapshot).
    pub(crate) fn insert(&mut self, activation: Activation) {
        if activation.status == ActivationStatus::Pending {
            self.queue.insert((Reverse(activation.salience), activation.id));
        }
        self.by_tuple.insert(activation.tuple, activation.id);
        self.activations.insert(activation.id, activation);
    }

    /// Removes the highest-priority pending activation and marks it firing.
    pub fn pop_next(&mut self) -> Option<ActivationId> {
        let (_, id) = self.queue.pop_first()?;
        if let Some(activation) = self.activations.get_mut(&id) {
            activation.status = ActivationStatus::Firing;
        }
        Some(id)
    }

    /// Looks up an activation.
    #[must_use]
    pub fn get(&self, id: ActivationId) -> Option<&Activation> {
        self.activations.get(&id)
    }

    /// Sets the status of an activation still on record.
    pub fn set_status(&mut self, id: ActivationId, status: ActivationStatus) {
        if let Some(activation) = self.activations.get_mut(&id) {
            if activation.status == ActivationStatus::Pending && status != ActivationStatus::Pending {
                self.queue.remove(&(Reverse(activation.salience), id));
            }
            activation.status = status;
        }
    }

    /// Cancels a pending activation. Returns true if it was pending.
    pub fn cancel(&mut self, id: ActivationId) -> bool {
        let pending = self
            .activations
            .get(&id)
            .is_some_and(|a| a.status == ActivationStatus::Pending);
        if pending {
            self.set_status(id, ActivationStatus::Cancelled);
        }
        pending
    }

    /// Forgets the activation bound to a retracted terminal tuple.
    ///
    /// Returns the activation as it was just before removal.
    pub fn unmatch(&mut self, tuple: TupleId) -> Option<Activation> {
        let id = self.by_tuple.remove(&tuple)?;
        let activation = self.activations.remove(&id)?;
        if activation.status == ActivationStatus::Pending {
            self.queue.remove(&(Reverse(activation.salience), id));
        }
        Some(activation)
    }

    /// Pending activations in firing order.
    pub fn pending(&self) -> impl Iterator<Item = &Activation> {
        self.queue.iter().filter_map(|(_, id)| self.activations.get(id))
    }

    /// Every activation on record, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Activation> {
        self.activations.values()
    }

    /// Number of pending activations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Number of activations on record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.activations.len()
    }

    /// Returns true if no activation is on record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }

    /// Sequence number of the most recently created activation.
    #[must_use]
    pub const fn last_sequence(&self) -> u64 {
        self.next_id
    }

    pub(crate) fn set_last_sequence(&mut self, sequence: u64) {
        self.next_id = sequence;
    }
}
