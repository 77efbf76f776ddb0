//! Error types for the Thicket system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::handle::{EntryPointId, FactHandle};
use crate::types::Type;

/// The main error type for Thicket operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates an unknown handle error.
    #[must_use]
    pub fn unknown_handle(handle: FactHandle) -> Self {
        Self::new(ErrorKind::UnknownHandle(handle))
    }

    /// Creates an unknown entry point error.
    #[must_use]
    pub fn unknown_entry_point(entry_point: EntryPointId) -> Self {
        Self::new(ErrorKind::UnknownEntryPoint(entry_point))
    }

    /// Creates an invalid justification error.
    #[must_use]
    pub fn invalid_justification(handle: FactHandle, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidJustification {
            handle,
            reason: reason.into(),
        })
    }

    /// Creates an action failure error.
    #[must_use]
    pub fn action_failure(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ActionFailure {
            rule: rule.into(),
            message: message.into(),
        })
    }

    /// Creates an inconsistent network state error.
    #[must_use]
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InconsistentNetworkState(message.into()))
    }

    /// Creates an invalid rule error.
    #[must_use]
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        })
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: Type, actual: Type) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected, actual })
    }

    /// Creates a semantic limit exceeded error.
    #[must_use]
    pub fn limit_exceeded(limit: SemanticLimit) -> Self {
        Self::new(ErrorKind::LimitExceeded(limit))
    }

    /// Returns true if this error poisons the session that raised it.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::InconsistentNetworkState(_))
    }
}

/// Categorized error kinds.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Operation referenced a fact handle that is not live.
    #[error("unknown fact handle: {0:?}")]
    UnknownHandle(FactHandle),

    /// Operation referenced an entry point the rule base does not declare.
    #[error("unknown entry point: {0:?}")]
    UnknownEntryPoint(EntryPointId),

    /// A fact used a field its template does not declare.
    #[error("unknown field {field} on template {template}")]
    UnknownField {
        /// The template name.
        template: String,
        /// The offending field name.
        field: String,
    },

    /// Type mismatch during template validation.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: Type,
        /// The actual type encountered.
        actual: Type,
    },

    /// Attempt to justify a directly asserted fact, or to remove a
    /// justification that does not exist.
    #[error("invalid justification for {handle:?}: {reason}")]
    InvalidJustification {
        /// The handle being justified.
        handle: FactHandle,
        /// Why the request was rejected.
        reason: String,
    },

    /// A rule action returned an error while firing.
    #[error("action of rule {rule} failed: {message}")]
    ActionFailure {
        /// The rule whose action failed.
        rule: String,
        /// The error raised by the action.
        message: String,
    },

    /// A core network invariant was violated. The session is unusable.
    #[error("inconsistent network state: {0}")]
    InconsistentNetworkState(String),

    /// A rule referenced a variable that no earlier condition binds.
    #[error("undefined variable ?{variable} in rule {rule}")]
    UndefinedVariable {
        /// The rule being compiled.
        rule: String,
        /// The unbound variable name.
        variable: String,
    },

    /// A rule could not be compiled into the network.
    #[error("invalid rule {rule}: {reason}")]
    InvalidRule {
        /// The rule being compiled.
        rule: String,
        /// Why compilation failed.
        reason: String,
    },

    /// Semantic limit exceeded (kill switch triggered).
    #[error("limit exceeded: {0}")]
    LimitExceeded(SemanticLimit),

    /// The session was halted and refuses to fire further activations.
    #[error("session halted")]
    SessionHalted,

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Semantic limits (kill switches) that can be exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticLimit {
    /// Maximum rule firings per `fire_all_rules` call exceeded.
    MaxActivations {
        /// The configured limit.
        limit: u32,
        /// Additional context about which rule(s) caused the issue.
        context: Option<String>,
    },
}

impl fmt::Display for SemanticLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxActivations { limit, context } => {
                write!(f, "max activations ({limit}) exceeded")?;
                if let Some(ctx) = context {
                    write!(f, ": {ctx}")?;
                }
                Ok(())
            }
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Rule name, if the error arose while firing.
    pub rule: Option<String>,
    /// Fact handle the operation targeted.
    pub handle: Option<FactHandle>,
    /// Chain of operations leading to the error, outermost first.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule name.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Sets the targeted fact handle.
    #[must_use]
    pub fn with_handle(mut self, handle: FactHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "in rule {rule}")?;
        }
        if let Some(handle) = &self.handle {
            write!(f, " on {handle}")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
