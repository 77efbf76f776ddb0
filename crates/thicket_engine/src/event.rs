//! Session events and listeners.
//!
//! A session reports every working-memory change, agenda change, and TMS
//! change to its registered listeners as it happens. Listeners only observe;
//! they cannot touch the session.

use std::sync::{Arc, Mutex, PoisonError};

use thicket_foundation::{FactHandle, KeywordId};

use crate::agenda::ActivationId;
use crate::tms::JustificationId;

/// Something that happened inside a session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A fact entered working memory.
    FactInserted {
        /// New handle.
        handle: FactHandle,
        /// Object type of the fact.
        object_type: KeywordId,
        /// True for logical (justified) inserts.
        logical: bool,
    },
    /// A live fact's value changed.
    FactUpdated {
        /// Handle of the fact.
        handle: FactHandle,
        /// Object type of the new value.
        object_type: KeywordId,
    },
    /// A fact left working memory.
    FactRetracted {
        /// Retracted handle.
        handle: FactHandle,
        /// Object type of the fact.
        object_type: KeywordId,
        /// True when retracted by the TMS rather than by request.
        cascaded: bool,
    },
    /// A rule matched and an activation was created.
    ActivationCreated {
        /// New activation.
        activation: ActivationId,
        /// Rule name.
        rule: Arc<str>,
        /// Rule salience.
        salience: i32,
    },
    /// A pending activation will no longer fire.
    ActivationCancelled {
        /// Cancelled activation.
        activation: ActivationId,
        /// Rule name.
        rule: Arc<str>,
    },
    /// An action is about to run.
    RuleFiring {
        /// Firing activation.
        activation: ActivationId,
        /// Rule name.
        rule: Arc<str>,
    },
    /// An action completed.
    RuleFired {
        /// Fired activation.
        activation: ActivationId,
        /// Rule name.
        rule: Arc<str>,
    },
    /// An action returned an error.
    RuleFailed {
        /// Failed activation.
        activation: ActivationId,
        /// Rule name.
        rule: Arc<str>,
        /// Error message.
        message: String,
    },
    /// A justification was recorded.
    JustificationAdded {
        /// New justification.
        justification: JustificationId,
        /// Justified handle.
        handle: FactHandle,
    },
    /// A justification was removed.
    JustificationRemoved {
        /// Removed justification.
        justification: JustificationId,
        /// Justified handle.
        handle: FactHandle,
    },
}

impl SessionEvent {
    /// Short event type name, used for filtering.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::FactInserted { .. } => "fact-inserted",
            Self::FactUpdated { .. } => "fact-updated",
            Self::FactRetracted { .. } => "fact-retracted",
            Self::ActivationCreated { .. } => "activation-created",
            Self::ActivationCancelled { .. } => "activation-cancelled",
            Self::RuleFiring { .. } => "rule-firing",
            Self::RuleFired { .. } => "rule-fired",
            Self::RuleFailed { .. } => "rule-failed",
            Self::JustificationAdded { .. } => "justification-added",
            Self::JustificationRemoved { .. } => "justification-removed",
        }
    }
}

/// Receives session events.
pub trait SessionListener: Send {
    /// Called for every event, in order.
    fn on_event(&mut self, event: &SessionEvent);
}

/// Shared listeners, so the caller can inspect them while the session runs.
impl<L: SessionListener> SessionListener for Arc<Mutex<L>> {
    fn on_event(&mut self, event: &SessionEvent) {
        let mut inner = self.lock().unwrap_or_else(PoisonError::into_inner);
        inner.on_event(event);
    }
}

/// Collects every event into a vector.
impl SessionListener for Vec<SessionEvent> {
    fn on_event(&mut self, event: &SessionEvent) {
        self.push(event.clone());
    }
}
