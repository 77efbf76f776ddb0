//! Session configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How direct inserts of equal facts are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EqualityMode {
    /// Every insert creates a new handle.
    #[default]
    Identity,
    /// Inserting a fact equal to a live direct fact in the same entry point
    /// returns the existing handle.
    Equality,
}

/// What `fire_all_rules` does after an action returns an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ActionErrorPolicy {
    /// Record the failure and keep firing.
    #[default]
    Continue,
    /// Record the failure and stop the loop.
    Halt,
}

/// Source of timestamps for stream entry points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClockType {
    /// Manually advanced clock starting at zero.
    #[default]
    Pseudo,
    /// Wall-clock milliseconds since the Unix epoch.
    Realtime,
}

/// Configuration for a [`Session`](crate::Session).
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    /// Equality mode for direct inserts.
    pub equality_mode: EqualityMode,
    /// Policy for action errors.
    pub action_error_policy: ActionErrorPolicy,
    /// Maximum activations fired per `fire_all_rules` call (`None` = unbounded).
    pub max_activations: Option<u32>,
    /// Clock used to stamp events.
    pub clock: ClockType,
}

impl SessionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the equality mode.
    #[must_use]
    pub fn equality_mode(mut self, mode: EqualityMode) -> Self {
        self.equality_mode = mode;
        self
    }

    /// Sets the action error policy.
    #[must_use]
    pub fn action_error_policy(mut self, policy: ActionErrorPolicy) -> Self {
        self.action_error_policy = policy;
        self
    }

    /// Bounds the number of activations fired per `fire_all_rules` call.
    #[must_use]
    pub fn max_activations(mut self, limit: u32) -> Self {
        self.max_activations = Some(limit);
        self
    }

    /// Sets the clock type.
    #[must_use]
    pub fn clock(mut self, clock: ClockType) -> Self {
        self.clock = clock;
        self
    }
}
