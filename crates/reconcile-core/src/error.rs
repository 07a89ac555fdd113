//! Reconciliation error types

use std::convert::Infallible;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error carried inside [`ComponentError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How a component failure affects the rest of the cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Abort the remaining components of this cycle
    Critical,
    /// Record and continue with the next component
    Advisory,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => f.write_str("critical"),
            Severity::Advisory => f.write_str("advisory"),
        }
    }
}

/// A failed component operation, tagged with its severity.
///
/// Idempotence responses (already exists on create, not found on delete) are
/// absorbed by the component and never surface as this type.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ComponentError {
    severity: Severity,
    #[source]
    source: BoxError,
}

impl ComponentError {
    /// Failure that blocks the rest of the cycle
    pub fn critical(err: impl Into<BoxError>) -> Self {
        Self {
            severity: Severity::Critical,
            source: err.into(),
        }
    }

    /// Failure that is reported but lets the cycle continue
    pub fn advisory(err: impl Into<BoxError>) -> Self {
        Self {
            severity: Severity::Advisory,
            source: err.into(),
        }
    }

    /// How the driver treats this failure
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Whether this failure stops the cycle
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Downgrade to advisory, keeping the cause
    pub fn into_advisory(self) -> Self {
        Self {
            severity: Severity::Advisory,
            ..self
        }
    }
}

/// Registry mutation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A component with this name is already registered
    #[error("component '{0}' is already registered")]
    Duplicate(String),

    /// The registration name differs from the component's own name
    #[error("component registered as '{registered}' reports its name as '{reported}'")]
    NameMismatch {
        /// Name passed to `register`
        registered: String,
        /// `Component::name()`
        reported: String,
    },
}

/// Outcome of a [`crate::ConvergenceWaiter`] that did not converge.
///
/// `E` is the probe's own fatal error type; waiters built without a probe
/// (configuration errors) use the `Infallible` default.
#[derive(Debug, Error)]
pub enum ConvergenceError<E = Infallible> {
    /// Timeout or poll interval rejected at construction
    #[error("invalid convergence settings: {0}")]
    InvalidConfig(String),

    /// The deadline passed while the probe still reported pending
    #[error("timed out after {elapsed:?} ({attempts} attempts) waiting for {operation}: {last_pending}")]
    Timeout {
        /// What was being waited for
        operation: String,
        /// Time spent waiting
        elapsed: Duration,
        /// Probe runs, including the first
        attempts: u32,
        /// Reason from the last pending probe
        last_pending: String,
    },

    /// The probe reported a fatal condition
    #[error("{operation} failed: {source}")]
    Probe {
        /// What was being waited for
        operation: String,
        /// Fatal error from the probe
        #[source]
        source: E,
    },

    /// The waiter's cancellation token fired
    #[error("cancelled while waiting for {operation}")]
    Cancelled {
        /// What was being waited for
        operation: String,
        /// Reason from the last pending probe, if one ran
        last_pending: Option<String>,
    },
}

impl<E> ConvergenceError<E> {
    /// Whether the deadline passed
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConvergenceError::Timeout { .. })
    }

    /// Whether the wait was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConvergenceError::Cancelled { .. })
    }
}

/// Versioned resource installation errors
#[derive(Debug, Error)]
pub enum AdapterError {
    /// No schema variant has a threshold at or below the platform version
    #[error("no schema variant of {resource} supports platform version {version}")]
    NoVariant { resource: String, version: String },

    /// The variant list cannot be used (empty, duplicate thresholds, mixed identity)
    #[error("invalid schema variants: {0}")]
    InvalidVariants(String),

    /// The create call failed with something other than "already exists"
    #[error("failed to submit {name}: {source}")]
    Submit {
        /// Definition name
        name: String,
        /// Error from the create call
        #[source]
        source: platform_client::PlatformError,
    },

    /// The platform refused the resource's names (conflict with another definition)
    #[error("names of {name} were not accepted: {reason}")]
    NameConflict {
        /// Definition name
        name: String,
        /// Message of the `NamesAccepted` condition
        reason: String,
    },

    /// The resource was submitted but never became usable
    #[error("{name} did not become established: {source}")]
    NotEstablished {
        /// Definition name
        name: String,
        /// Why the establish wait ended
        #[source]
        source: Box<ConvergenceError<AdapterError>>,
    },
}
