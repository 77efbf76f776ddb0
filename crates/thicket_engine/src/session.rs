//! Sessions: working memory plus the recognize-act loop.
//!
//! A [`Session`] owns every piece of mutable state that sits on top of a
//! shared [`RuleBase`]: the fact registry, node memories, the tuple arena, the
//! agenda, the truth maintenance ledger, and the clock. All mutation goes
//! through `&mut self`, so a session is a single writer by construction.
//!
//! Every operation runs propagation to completion before returning. Terminal
//! events produced by the network are turned into activations afterwards, and
//! handles that lose their last justification are retracted through one
//! iterative work queue.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use thicket_foundation::{
    EntryPointId, Error, ErrorContext, ErrorKind, Fact, FactHandle, Interner, KeywordId, Result,
    SemanticLimit, Value,
};

use crate::agenda::{Activation, ActivationId, ActivationStatus, Agenda};
use crate::config::{ActionErrorPolicy, EqualityMode, SessionConfig};
use crate::event::{SessionEvent, SessionListener};
use crate::network::memory::{MemoryStats, NodeMemories};
use crate::network::propagate::{Propagator, TerminalEvent};
use crate::network::tuple::{TupleArena, TupleEntry, TupleId};
use crate::network::{NodeId, RuleBase, RuleId};
use crate::rule::Bindings;
use crate::tms::{BeliefState, Justification, JustificationId, TruthMaintenance};
use crate::working_memory::{EventMetadata, FactRecord, FactRegistry, SessionClock};

// =============================================================================
// Session
// =============================================================================

/// Outcome of one [`Session::fire_all_rules`] call.
#[derive(Debug, Default)]
pub struct FireSummary {
    /// Number of actions run, failed ones included.
    pub fired: u32,
    /// One `ActionFailure` per failed action, in firing order.
    pub failures: Vec<Error>,
    /// True if the loop stopped because the session was halted.
    pub halted: bool,
}

impl FireSummary {
    /// Returns true if every action completed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// An activation whose tuple was retracted during the first half of a modify.
struct Unmatched {
    activation: ActivationId,
    rule: RuleId,
    entries: Vec<TupleEntry>,
}

/// A running rule engine instance.
pub struct Session {
    pub(crate) rule_base: Arc<RuleBase>,
    pub(crate) config: SessionConfig,
    pub(crate) interner: Interner,
    pub(crate) facts: FactRegistry,
    pub(crate) memories: NodeMemories,
    pub(crate) arena: TupleArena,
    pub(crate) agenda: Agenda,
    pub(crate) tms: TruthMaintenance,
    pub(crate) clock: SessionClock,
    rule_names: Vec<Arc<str>>,
    listeners: Vec<Box<dyn SessionListener>>,
    firing: Option<(ActivationId, RuleId)>,
    pub(crate) halted: bool,
    poisoned: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("facts", &self.facts.len())
            .field("activations", &self.agenda.len())
            .field("pending", &self.agenda.pending_count())
            .field("justifications", &self.tms.len())
            .field("halted", &self.halted)
            .field("poisoned", &self.poisoned.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session over a rule base with the default configuration.
    ///
    /// # Errors
    /// Returns `InconsistentNetworkState` if seeding the root tuples fails.
    pub fn new(rule_base: Arc<RuleBase>) -> Result<Self> {
        Self::with_config(rule_base, SessionConfig::default())
    }

    /// Creates a session over a rule base.
    ///
    /// Rules whose first condition is not a positive pattern are seeded with
    /// the empty root tuple here, so they can match before any fact arrives.
    ///
    /// # Errors
    /// Returns `InconsistentNetworkState` if seeding the root tuples fails.
    pub fn with_config(rule_base: Arc<RuleBase>, config: SessionConfig) -> Result<Self> {
        let mut session = Self::empty(rule_base, config);
        let events = session.propagate_root()?;
        session.settle(events)?;
        Ok(session)
    }

    /// A session with no state at all, not even root tuples.
    pub(crate) fn empty(rule_base: Arc<RuleBase>, config: SessionConfig) -> Self {
        let rule_names = rule_base.rules().map(|r| Arc::from(r.rule.name.as_str())).collect();
        Self {
            interner: rule_base.interner().clone(),
            memories: NodeMemories::for_rule_base(&rule_base),
            clock: SessionClock::new(config.clock),
            facts: FactRegistry::new(),
            arena: TupleArena::new(),
            agenda: Agenda::new(),
            tms: TruthMaintenance::new(),
            rule_names,
            listeners: Vec::new(),
            firing: None,
            halted: false,
            poisoned: None,
            rule_base,
            config,
        }
    }

    /// Registers a listener for session events.
    pub fn add_listener(&mut self, listener: impl SessionListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: &SessionEvent) {
        for listener in &mut self.listeners {
            listener.on_event(event);
        }
    }

    fn rule_name(&self, rule: RuleId) -> Arc<str> {
        self.rule_names
            .get(rule.index())
            .cloned()
            .unwrap_or_else(|| Arc::from(format!("{rule:?}")))
    }

    // =========================================================================
    // Poisoning
    // =========================================================================

    /// Returns true once an internal inconsistency has been detected.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    fn ensure_usable(&self) -> Result<()> {
        match &self.poisoned {
            Some(message) => Err(Error::inconsistent(message.clone())),
            None => Ok(()),
        }
    }

    /// Poisons the session if `result` carries a fatal error.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() && self.poisoned.is_none() {
                self.poisoned = Some(match &e.kind {
                    ErrorKind::InconsistentNetworkState(message) => message.clone(),
                    other => other.to_string(),
                });
            }
        }
        result
    }

    // =========================================================================
    // Propagation plumbing
    // =========================================================================

    pub(crate) fn propagate_root(&mut self) -> Result<Vec<TerminalEvent>> {
        let result = {
            let mut propagator =
                Propagator::new(&self.rule_base, &self.facts, &mut self.memories, &mut self.arena);
            match propagator.assert_root() {
                Ok(()) => propagator.run(),
                Err(e) => Err(e),
            }
        };
        self.guard(result)
    }

    pub(crate) fn propagate_assert(&mut self, handle: FactHandle) -> Result<Vec<TerminalEvent>> {
        let result = match self.facts.fact(handle) {
            Some(fact) => {
                let fact = fact.clone();
                let mut propagator =
                    Propagator::new(&self.rule_base, &self.facts, &mut self.memories, &mut self.arena);
                propagator.assert_fact(handle, &fact);
                propagator.run()
            }
            None => Err(Error::inconsistent(format!("asserting dead {handle:?}"))),
        };
        self.guard(result)
    }

    fn propagate_retract(&mut self, handle: FactHandle, fact: &Fact) -> Result<Vec<TerminalEvent>> {
        let result = {
            let mut propagator =
                Propagator::new(&self.rule_base, &self.facts, &mut self.memories, &mut self.arena);
            propagator.retract_fact(handle, fact);
            propagator.run()
        };
        self.guard(result)
    }

    /// Applies terminal events, then cascades any orphaned justified facts.
    fn settle(&mut self, events: Vec<TerminalEvent>) -> Result<()> {
        let mut orphans = VecDeque::new();
        self.apply_terminal_events(events, &mut orphans, None)?;
        self.cascade(orphans)
    }

    /// Turns terminal events into agenda changes.
    ///
    /// Returns the activations created. With `stash`, unmatched activations
    /// that still own justifications are set aside instead of releasing them.
    fn apply_terminal_events(
        &mut self,
        events: Vec<TerminalEvent>,
        orphans: &mut VecDeque<FactHandle>,
        mut stash: Option<&mut Vec<Unmatched>>,
    ) -> Result<Vec<ActivationId>> {
        let mut created = Vec::new();
        for event in events {
            match event {
                TerminalEvent::Matched { rule, tuple } => {
                    created.push(self.create_activation(rule, tuple)?);
                }
                TerminalEvent::Unmatched { rule, tuple } => {
                    let Some(activation) = self.agenda.unmatch(tuple) else {
                        let err = Error::inconsistent(format!("no activation for retracted {tuple:?}"));
                        return self.guard(Err(err));
                    };
                    let released = self.arena.release(tuple);
                    let released = self.guard(released)?;
                    if activation.status == ActivationStatus::Pending {
                        let name = self.rule_name(rule);
                        self.emit(&SessionEvent::ActivationCancelled {
                            activation: activation.id,
                            rule: name,
                        });
                    }
                    match stash.as_deref_mut() {
                        Some(stash) if !self.tms.owned_by(activation.id).is_empty() => {
                            stash.push(Unmatched {
                                activation: activation.id,
                                rule,
                                entries: released.entries,
                            });
                        }
                        _ => orphans.extend(self.release_justifications(activation.id)),
                    }
                }
            }
        }
        Ok(created)
    }

    fn create_activation(&mut self, rule: RuleId, tuple: TupleId) -> Result<ActivationId> {
        let Some(compiled) = self.rule_base.rule(rule) else {
            return self.guard(Err(Error::inconsistent(format!("terminal for unknown {rule:?}"))));
        };
        let salience = compiled.rule.salience;
        let suppressed = compiled.rule.no_loop && self.firing.is_some_and(|(_, firing)| firing == rule);
        let id = self.agenda.create(rule, tuple, salience, suppressed);
        if !suppressed {
            let name = self.rule_name(rule);
            self.emit(&SessionEvent::ActivationCreated {
                activation: id,
                rule: name,
                salience,
            });
        }
        Ok(id)
    }

    /// Drops every justification owned by an activation.
    fn release_justifications(&mut self, activation: ActivationId) -> Vec<FactHandle> {
        let mut orphans = Vec::new();
        for id in self.tms.owned_by(activation) {
            let Some(handle) = self.tms.get(id).map(|j| j.justified) else {
                continue;
            };
            self.emit(&SessionEvent::JustificationRemoved {
                justification: id,
                handle,
            });
            if let Some(orphan) = self.tms.remove(id) {
                orphans.push(orphan);
            }
        }
        orphans
    }

    /// Retracts orphaned handles until the queue is empty.
    fn cascade(&mut self, mut queue: VecDeque<FactHandle>) -> Result<()> {
        while let Some(handle) = queue.pop_front() {
            if !self.facts.is_live(handle) {
                continue;
            }
            self.retract_one(handle, true, &mut queue)?;
        }
        Ok(())
    }

    /// Retracts one live handle, queueing the handles it orphans.
    fn retract_one(&mut self, handle: FactHandle, cascaded: bool, queue: &mut VecDeque<FactHandle>) -> Result<()> {
        let fact = self
            .facts
            .fact(handle)
            .cloned()
            .ok_or_else(|| Error::unknown_handle(handle))?;
        let events = self.propagate_retract(handle, &fact)?;
        let removed = self.facts.remove(handle);
        self.guard(removed)?;

        let own: Vec<JustificationId> = self.tms.justifications_of(handle).iter().map(|j| j.id).collect();
        let supported = self.tms.supported_by(handle);
        for id in own {
            self.emit(&SessionEvent::JustificationRemoved {
                justification: id,
                handle,
            });
        }
        for (id, justified) in supported {
            self.emit(&SessionEvent::JustificationRemoved {
                justification: id,
                handle: justified,
            });
        }
        queue.extend(self.tms.forget(handle));

        self.emit(&SessionEvent::FactRetracted {
            handle,
            object_type: fact.object_type(),
            cascaded,
        });
        self.apply_terminal_events(events, queue, None)?;
        Ok(())
    }

    // =========================================================================
    // Working memory operations
    // =========================================================================

    /// Checks that a fact may enter an entry point.
    fn validate(&self, entry_point: EntryPointId, fact: &Fact) -> Result<()> {
        if !self.rule_base.has_entry_point(entry_point) {
            return Err(Error::unknown_entry_point(entry_point));
        }
        if let Some(template) = self.rule_base.template(fact.object_type()) {
            template.validate(fact, &self.interner)?;
        }
        Ok(())
    }

    fn event_metadata_for(&self, entry_point: EntryPointId, duration: u64) -> Option<EventMetadata> {
        self.rule_base.is_stream(entry_point).then(|| EventMetadata {
            timestamp: self.clock.now(),
            duration,
        })
    }

    /// Asserts a fact into the default entry point.
    ///
    /// # Errors
    /// Returns `UnknownField` / `TypeMismatch` if the fact violates its
    /// template, or `InconsistentNetworkState` if the session is poisoned.
    pub fn insert(&mut self, fact: Fact) -> Result<FactHandle> {
        self.insert_into(EntryPointId::DEFAULT, fact)
    }

    /// Asserts a fact into an entry point.
    ///
    /// Under [`EqualityMode::Equality`] an equal live direct fact's handle is
    /// returned instead of creating a new one.
    ///
    /// # Errors
    /// Returns `UnknownEntryPoint` for an undeclared entry point, template
    /// errors, or `InconsistentNetworkState` if the session is poisoned.
    pub fn insert_into(&mut self, entry_point: EntryPointId, fact: Fact) -> Result<FactHandle> {
        self.insert_direct(entry_point, fact, 0)
    }

    /// Asserts an event with a duration into a stream entry point.
    ///
    /// # Errors
    /// Returns `UnknownEntryPoint` if the entry point is not a declared stream,
    /// plus every error of [`Session::insert_into`].
    pub fn insert_event(&mut self, entry_point: EntryPointId, fact: Fact, duration: u64) -> Result<FactHandle> {
        if !self.rule_base.is_stream(entry_point) {
            return Err(Error::unknown_entry_point(entry_point));
        }
        self.insert_direct(entry_point, fact, duration)
    }

    fn insert_direct(&mut self, entry_point: EntryPointId, fact: Fact, duration: u64) -> Result<FactHandle> {
        self.ensure_usable()?;
        self.validate(entry_point, &fact)?;
        if self.config.equality_mode == EqualityMode::Equality {
            if let Some(existing) = self.facts.find_direct(entry_point, &fact) {
                return Ok(existing);
            }
        }
        let handle = self.facts.allocate(entry_point);
        let object_type = fact.object_type();
        let record = FactRecord {
            handle,
            fact,
            event: self.event_metadata_for(entry_point, duration),
            logical: false,
        };
        let stored = self.facts.insert(record);
        self.guard(stored)?;
        self.emit(&SessionEvent::FactInserted {
            handle,
            object_type,
            logical: false,
        });
        let events = self.propagate_assert(handle)?;
        self.settle(events)?;
        Ok(handle)
    }

    /// Asserts a fact justified by live handles.
    ///
    /// If an equal justified fact already lives in the entry point, the
    /// justification is added to it and its handle is returned.
    ///
    /// # Errors
    /// Returns `InvalidJustification` for an empty justifier set,
    /// `UnknownHandle` if a justifier is not live, plus every error of
    /// [`Session::insert_into`].
    pub fn insert_justified(
        &mut self,
        entry_point: EntryPointId,
        fact: Fact,
        justifiers: Vec<FactHandle>,
    ) -> Result<FactHandle> {
        self.ensure_usable()?;
        if justifiers.is_empty() {
            return Err(Error::invalid_justification(
                FactHandle::new(0, entry_point),
                "a justification needs at least one justifier",
            ));
        }
        if let Some(dead) = justifiers.iter().find(|h| !self.facts.is_live(**h)) {
            return Err(Error::unknown_handle(*dead));
        }
        self.insert_logical(entry_point, fact, justifiers, None, None)
    }

    pub(crate) fn insert_logical(
        &mut self,
        entry_point: EntryPointId,
        fact: Fact,
        justifiers: Vec<FactHandle>,
        rule: Option<RuleId>,
        activation: Option<ActivationId>,
    ) -> Result<FactHandle> {
        self.validate(entry_point, &fact)?;
        if let Some(existing) = self.facts.find_logical(entry_point, &fact) {
            let before = self.tms.len();
            let id = self.tms.add_justification(existing, justifiers, rule, activation)?;
            if self.tms.len() > before {
                self.emit(&SessionEvent::JustificationAdded {
                    justification: id,
                    handle: existing,
                });
            }
            return Ok(existing);
        }

        let handle = self.facts.allocate(entry_point);
        let object_type = fact.object_type();
        let record = FactRecord {
            handle,
            fact,
            event: self.event_metadata_for(entry_point, 0),
            logical: true,
        };
        let stored = self.facts.insert(record);
        self.guard(stored)?;
        let id = self.tms.justify_new(handle, justifiers, rule, activation);
        self.emit(&SessionEvent::FactInserted {
            handle,
            object_type,
            logical: true,
        });
        self.emit(&SessionEvent::JustificationAdded {
            justification: id,
            handle,
        });
        let events = self.propagate_assert(handle)?;
        self.settle(events)?;
        Ok(handle)
    }

    /// Replaces the value of a live fact, keeping its handle.
    ///
    /// The network sees a retraction of the old value followed by an
    /// assertion of the new one. Justifications owned by an activation that
    /// matches again with the same rule and the same tuple are carried over
    /// to the new activation.
    ///
    /// # Errors
    /// Returns `UnknownHandle` if the handle is not live, template errors, or
    /// `InconsistentNetworkState` if the session is poisoned.
    pub fn update(&mut self, handle: FactHandle, fact: Fact) -> Result<()> {
        self.ensure_usable()?;
        let old = self
            .facts
            .fact(handle)
            .cloned()
            .ok_or_else(|| Error::unknown_handle(handle))?;
        self.validate(handle.entry_point, &fact)?;

        let mut orphans = VecDeque::new();
        let mut unmatched = Vec::new();
        let events = self.propagate_retract(handle, &old)?;
        self.apply_terminal_events(events, &mut orphans, Some(&mut unmatched))?;

        let object_type = fact.object_type();
        let replaced = self.facts.replace(handle, fact);
        self.guard(replaced)?;
        self.emit(&SessionEvent::FactUpdated { handle, object_type });

        let events = self.propagate_assert(handle)?;
        let created = self.apply_terminal_events(events, &mut orphans, None)?;

        for old in unmatched {
            let successor = created.iter().copied().find(|id| {
                self.agenda.get(*id).is_some_and(|a| {
                    a.rule == old.rule
                        && self
                            .arena
                            .get(a.tuple)
                            .is_ok_and(|t| t.entries == old.entries)
                })
            });
            match successor {
                Some(new) => self.tms.transfer(old.activation, new),
                None => orphans.extend(self.release_justifications(old.activation)),
            }
        }
        self.cascade(orphans)
    }

    /// Retracts a live fact and everything that depended on it.
    ///
    /// # Errors
    /// Returns `UnknownHandle` if the handle is not live, or
    /// `InconsistentNetworkState` if the session is poisoned.
    pub fn retract(&mut self, handle: FactHandle) -> Result<()> {
        self.ensure_usable()?;
        if !self.facts.is_live(handle) {
            return Err(Error::unknown_handle(handle));
        }
        let mut queue = VecDeque::new();
        self.retract_one(handle, false, &mut queue)?;
        self.cascade(queue)
    }

    // =========================================================================
    // Truth maintenance
    // =========================================================================

    /// Adds a justification to a justified fact.
    ///
    /// # Errors
    /// Returns `UnknownHandle` if any handle is not live, and
    /// `InvalidJustification` for a directly asserted fact, an empty justifier
    /// set, or a justification that would form a cycle.
    pub fn add_justification(&mut self, handle: FactHandle, justifiers: Vec<FactHandle>) -> Result<JustificationId> {
        self.ensure_usable()?;
        if !self.facts.is_live(handle) {
            return Err(Error::unknown_handle(handle));
        }
        if justifiers.is_empty() {
            return Err(Error::invalid_justification(
                handle,
                "a justification needs at least one justifier",
            ));
        }
        if let Some(dead) = justifiers.iter().find(|h| !self.facts.is_live(**h)) {
            return Err(Error::unknown_handle(*dead));
        }
        let before = self.tms.len();
        let id = self.tms.add_justification(handle, justifiers, None, None)?;
        if self.tms.len() > before {
            self.emit(&SessionEvent::JustificationAdded {
                justification: id,
                handle,
            });
        }
        Ok(id)
    }

    /// Removes one justification; retracts the fact if it was the last.
    ///
    /// # Errors
    /// Returns `UnknownHandle` if the handle is not live, or
    /// `InvalidJustification` if the handle has no such justification.
    pub fn remove_justification(&mut self, handle: FactHandle, justification: JustificationId) -> Result<()> {
        self.ensure_usable()?;
        if !self.facts.is_live(handle) {
            return Err(Error::unknown_handle(handle));
        }
        let orphaned = self.tms.remove_justification(handle, justification)?;
        self.emit(&SessionEvent::JustificationRemoved {
            justification,
            handle,
        });
        if orphaned {
            self.cascade(VecDeque::from([handle]))?;
        }
        Ok(())
    }

    /// Justifications currently supporting a handle.
    #[must_use]
    pub fn justifications(&self, handle: FactHandle) -> Vec<&Justification> {
        self.tms.justifications_of(handle)
    }

    /// Belief state of a live handle.
    ///
    /// # Errors
    /// Returns `UnknownHandle` if the handle is not live.
    pub fn belief_state(&self, handle: FactHandle) -> Result<BeliefState> {
        if !self.facts.is_live(handle) {
            return Err(Error::unknown_handle(handle));
        }
        Ok(self.tms.belief_state(handle))
    }

    /// The justification ledger.
    #[must_use]
    pub fn truth_maintenance(&self) -> &TruthMaintenance {
        &self.tms
    }

    // =========================================================================
    // Firing
    // =========================================================================

    /// Fires pending activations until the agenda is empty or the session halts.
    ///
    /// Action errors do not abort the loop: each becomes an `ActionFailure`
    /// in the summary, and the loop goes on unless the error policy is
    /// [`ActionErrorPolicy::Halt`].
    ///
    /// # Errors
    /// Returns `SessionHalted` if the session was halted before the call,
    /// `LimitExceeded` when `max_activations` firings did not drain the
    /// agenda, or `InconsistentNetworkState` on internal failure.
    pub fn fire_all_rules(&mut self) -> Result<FireSummary> {
        self.ensure_usable()?;
        if self.firing.is_some() {
            return Err(Error::new(ErrorKind::Internal(
                "fire_all_rules called from inside an action".to_string(),
            )));
        }
        if self.halted {
            return Err(Error::new(ErrorKind::SessionHalted));
        }

        let mut summary = FireSummary::default();
        let mut last_rule = None;
        loop {
            if self.halted {
                summary.halted = true;
                break;
            }
            if self.agenda.pending_count() == 0 {
                break;
            }
            if let Some(limit) = self.config.max_activations {
                if summary.fired >= limit {
                    let context = last_rule.map(|r: RuleId| format!("last fired rule {}", self.rule_name(r)));
                    return Err(Error::limit_exceeded(SemanticLimit::MaxActivations { limit, context }));
                }
            }
            let Some(id) = self.agenda.pop_next() else {
                break;
            };
            last_rule = self.agenda.get(id).map(|a| a.rule);
            self.fire(id, &mut summary)?;
        }
        Ok(summary)
    }

    fn fire(&mut self, id: ActivationId, summary: &mut FireSummary) -> Result<()> {
        let rule_base = Arc::clone(&self.rule_base);
        let Some(activation) = self.agenda.get(id).cloned() else {
            return self.guard(Err(Error::inconsistent(format!("{id:?} vanished before firing"))));
        };
        let Some(compiled) = rule_base.rule(activation.rule) else {
            return self.guard(Err(Error::inconsistent(format!("{id:?} names unknown rule"))));
        };
        let name = self.rule_name(activation.rule);

        let entries = match self.arena.get(activation.tuple) {
            Ok(tuple) => tuple.entries.clone(),
            Err(e) => return self.guard(Err(e)),
        };
        let mut bindings = Bindings::new();
        for (var, declaration) in &compiled.declarations {
            let value = declaration.resolve(&entries, &self.facts);
            bindings.set(var.clone(), self.guard(value)?);
        }
        let handles: Vec<FactHandle> = entries.iter().filter_map(TupleEntry::handle).collect();

        if let Some(group) = &compiled.rule.activation_group {
            let rivals: Vec<Activation> = self
                .agenda
                .pending()
                .filter(|a| {
                    rule_base
                        .rule(a.rule)
                        .is_some_and(|r| r.rule.activation_group.as_ref() == Some(group))
                })
                .cloned()
                .collect();
            for rival in rivals {
                if self.agenda.cancel(rival.id) {
                    let rival_name = self.rule_name(rival.rule);
                    self.emit(&SessionEvent::ActivationCancelled {
                        activation: rival.id,
                        rule: rival_name,
                    });
                }
            }
        }

        self.emit(&SessionEvent::RuleFiring {
            activation: id,
            rule: Arc::clone(&name),
        });
        let previous = self.firing.replace((id, activation.rule));
        let outcome = {
            let mut context = RuleContext {
                session: self,
                rule: activation.rule,
                activation: id,
                bindings,
                handles,
            };
            (compiled.rule.action)(&mut context)
        };
        self.firing = previous;
        summary.fired += 1;

        if self.poisoned.is_some() {
            return self.ensure_usable();
        }
        match outcome {
            Ok(()) => {
                if self.agenda.get(id).is_some_and(|a| a.status == ActivationStatus::Firing) {
                    self.agenda.set_status(id, ActivationStatus::Fired);
                }
                self.emit(&SessionEvent::RuleFired { activation: id, rule: name });
            }
            Err(e) => {
                if self.agenda.get(id).is_some_and(|a| a.status == ActivationStatus::Firing) {
                    self.agenda.set_status(id, ActivationStatus::Failed);
                }
                let message = e.to_string();
                self.emit(&SessionEvent::RuleFailed {
                    activation: id,
                    rule: Arc::clone(&name),
                    message: message.clone(),
                });
                let mut context = ErrorContext::new().with_rule(&*name);
                if let Some(first) = activation_first_handle(&entries) {
                    context = context.with_handle(first);
                }
                summary
                    .failures
                    .push(Error::action_failure(&*name, message).with_context(context));
                if self.config.action_error_policy == ActionErrorPolicy::Halt {
                    self.halted = true;
                }
            }
        }
        Ok(())
    }

    /// Stops the current firing loop; later loops are refused until [`Session::resume`].
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Clears a halt.
    pub fn resume(&mut self) {
        self.halted = false;
    }

    /// Returns true while the session is halted.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The shared rule base.
    #[must_use]
    pub fn rule_base(&self) -> &Arc<RuleBase> {
        &self.rule_base
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Keyword interner (rule base keywords plus any interned since).
    #[must_use]
    pub const fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Mutable keyword interner.
    pub fn interner_mut(&mut self) -> &mut Interner {
        &mut self.interner
    }

    /// Interns a keyword.
    pub fn keyword(&mut self, name: &str) -> KeywordId {
        self.interner.intern_keyword(name)
    }

    /// Value of a live fact.
    #[must_use]
    pub fn fact(&self, handle: FactHandle) -> Option<&Fact> {
        self.facts.fact(handle)
    }

    /// Returns true if the handle is live.
    #[must_use]
    pub fn is_live(&self, handle: FactHandle) -> bool {
        self.facts.is_live(handle)
    }

    /// Number of live facts.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    /// Live facts of an entry point, in handle order.
    #[must_use]
    pub fn facts(&self, entry_point: EntryPointId) -> Vec<(FactHandle, &Fact)> {
        self.facts
            .iter()
            .filter(|r| r.handle.entry_point == entry_point)
            .map(|r| (r.handle, &r.fact))
            .collect()
    }

    /// Live handles of an object type, in handle order.
    #[must_use]
    pub fn facts_of_type(&self, object_type: KeywordId) -> Vec<FactHandle> {
        self.facts.handles_of_type(object_type)
    }

    /// The fact registry.
    #[must_use]
    pub const fn registry(&self) -> &FactRegistry {
        &self.facts
    }

    /// Event timing of a fact in a stream entry point.
    #[must_use]
    pub fn event_metadata(&self, handle: FactHandle) -> Option<EventMetadata> {
        self.facts.get(handle).and_then(|r| r.event)
    }

    /// The agenda.
    #[must_use]
    pub const fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    /// Pending activations in firing order.
    #[must_use]
    pub fn pending_activations(&self) -> Vec<&Activation> {
        self.agenda.pending().collect()
    }

    /// Looks up an activation still bound to a tuple.
    #[must_use]
    pub fn activation(&self, id: ActivationId) -> Option<&Activation> {
        self.agenda.get(id)
    }

    /// Name of the rule an activation belongs to.
    #[must_use]
    pub fn activation_rule(&self, id: ActivationId) -> Option<&str> {
        let activation = self.agenda.get(id)?;
        self.rule_names.get(activation.rule.index()).map(|name| &**name)
    }

    /// Fact handles of an activation's tuple, in condition order.
    #[must_use]
    pub fn activation_handles(&self, id: ActivationId) -> Option<Vec<FactHandle>> {
        let activation = self.agenda.get(id)?;
        let tuple = self.arena.get(activation.tuple).ok()?;
        Some(tuple.handles().collect())
    }

    /// Tuple entries of an activation.
    #[must_use]
    pub fn activation_entries(&self, id: ActivationId) -> Option<&[TupleEntry]> {
        let activation = self.agenda.get(id)?;
        self.arena.get(activation.tuple).ok().map(|t| t.entries.as_slice())
    }

    /// Number of evaluations an alpha node has performed.
    #[must_use]
    pub fn alpha_evaluations(&self, node: NodeId) -> Option<u64> {
        self.memories.evaluations(node)
    }

    /// Memory sizes of a node.
    #[must_use]
    pub fn memory_stats(&self, node: NodeId) -> MemoryStats {
        self.memories.stats(node)
    }

    /// Number of live tuples in the arena.
    #[must_use]
    pub fn live_tuples(&self) -> usize {
        self.arena.live()
    }

    /// The session clock.
    #[must_use]
    pub const fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// Advances a pseudo clock.
    pub fn advance_time(&mut self, millis: u64) {
        self.clock.advance(millis);
    }
}

fn activation_first_handle(entries: &[TupleEntry]) -> Option<FactHandle> {
    entries.iter().find_map(TupleEntry::handle)
}

// =============================================================================
// Rule context
// =============================================================================

/// What an action sees while it runs.
///
/// Working-memory changes made through the context propagate immediately;
/// the activations they create join the agenda and fire later in the same
/// [`Session::fire_all_rules`] loop.
pub struct RuleContext<'s> {
    session: &'s mut Session,
    rule: RuleId,
    activation: ActivationId,
    bindings: Bindings,
    handles: Vec<FactHandle>,
}

impl RuleContext<'_> {
    /// Name of the firing rule.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        self.session
            .rule_names
            .get(self.rule.index())
            .map_or("", |name| &**name)
    }

    /// The firing activation.
    #[must_use]
    pub const fn activation(&self) -> ActivationId {
        self.activation
    }

    /// Variable bindings of the match.
    #[must_use]
    pub const fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Value bound to a variable.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.bindings.get(var)
    }

    /// Fact handle bound to a variable.
    ///
    /// # Errors
    /// Returns `UndefinedVariable` if the variable is not bound to a fact.
    pub fn handle(&self, var: &str) -> Result<FactHandle> {
        self.bindings.get_fact(var).ok_or_else(|| {
            Error::new(ErrorKind::UndefinedVariable {
                rule: self.rule_name().to_string(),
                variable: var.to_string(),
            })
        })
    }

    /// Fact handles of the matched tuple, in condition order.
    #[must_use]
    pub fn handles(&self) -> &[FactHandle] {
        &self.handles
    }

    /// Current value of a live fact.
    #[must_use]
    pub fn fact(&self, handle: FactHandle) -> Option<&Fact> {
        self.session.fact(handle)
    }

    /// Read access to the session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &*self.session
    }

    /// Interns a keyword.
    pub fn keyword(&mut self, name: &str) -> KeywordId {
        self.session.keyword(name)
    }

    /// Asserts a fact into the default entry point.
    ///
    /// # Errors
    /// See [`Session::insert`].
    pub fn insert(&mut self, fact: Fact) -> Result<FactHandle> {
        self.session.insert(fact)
    }

    /// Asserts a fact into an entry point.
    ///
    /// # Errors
    /// See [`Session::insert_into`].
    pub fn insert_into(&mut self, entry_point: EntryPointId, fact: Fact) -> Result<FactHandle> {
        self.session.insert_into(entry_point, fact)
    }

    /// Asserts a fact justified by this match, in the default entry point.
    ///
    /// # Errors
    /// See [`RuleContext::insert_logical_into`].
    pub fn insert_logical(&mut self, fact: Fact) -> Result<FactHandle> {
        self.insert_logical_into(EntryPointId::DEFAULT, fact)
    }

    /// Asserts a fact justified by this match.
    ///
    /// The justification names the matched facts, the rule, and the
    /// activation; it goes away when the match does.
    ///
    /// # Errors
    /// Returns `InvalidJustification` if the match no longer holds (the
    /// action already retracted part of it), plus every error of
    /// [`Session::insert_into`].
    pub fn insert_logical_into(&mut self, entry_point: EntryPointId, fact: Fact) -> Result<FactHandle> {
        self.session.ensure_usable()?;
        if self.session.agenda.get(self.activation).is_none() {
            return Err(Error::invalid_justification(
                FactHandle::new(0, entry_point),
                format!("{} no longer matches", self.activation),
            ));
        }
        let justifiers = self.handles.clone();
        self.session
            .insert_logical(entry_point, fact, justifiers, Some(self.rule), Some(self.activation))
    }

    /// Replaces the value of a live fact.
    ///
    /// # Errors
    /// See [`Session::update`].
    pub fn update(&mut self, handle: FactHandle, fact: Fact) -> Result<()> {
        self.session.update(handle, fact)
    }

    /// Retracts a live fact.
    ///
    /// # Errors
    /// See [`Session::retract`].
    pub fn retract(&mut self, handle: FactHandle) -> Result<()> {
        self.session.retract(handle)
    }

    /// Halts the session after this action.
    pub fn halt(&mut self) {
        self.session.halt();
    }
}
