//! Error types for the graft workspace.
//!
//! Provides [`GraftError`] as the top-level error type. Variants are
//! grouped into configuration-time failures (caught before an agent is
//! opened), run-fatal failures, and transient conditions so callers can
//! tell which outcomes are worth retrying. Non-exhaustive to allow
//! future extension without breaking downstream.

use thiserror::Error;

/// Top-level error type for the graft workspace.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GraftError {
    // ── Boundary ─────────────────────────────────────────────────────

    /// An invalid configuration combination was detected before the
    /// agent was opened (e.g. unknown output format).
    #[error("invalid config: {reason}")]
    Config {
        /// What is wrong with the configuration.
        reason: String,
    },

    // ── Run-fatal ────────────────────────────────────────────────────

    /// Populating or releasing the sandbox failed.
    #[error("sandbox error: {reason}")]
    Sandbox {
        /// What went wrong with the sandbox.
        reason: String,
    },

    /// The agent terminated without producing an artifact, or exhausted
    /// its iteration budget without a passing validation.
    #[error("agent protocol error: {reason}")]
    AgentProtocol {
        /// Last observed state, typically the missing-artifact path or
        /// the final validator message.
        reason: String,
    },

    /// The artifact exists but did not pass structural validation.
    #[error("validation failed: {errors:?}")]
    ValidationFailed {
        /// Bounded list of validator messages.
        errors: Vec<String>,
    },

    /// The domain validator reported blocking issues at the final gate.
    #[error("domain validation failed: {errors:?}")]
    Domain {
        /// Bounded list of `path: message` strings.
        errors: Vec<String>,
    },

    /// A session rejected a query because one is already in flight.
    #[error("session is already processing a message")]
    SessionBusy,

    /// A session operation was attempted before `initialize` or after
    /// `close`.
    #[error("session is not active: {reason}")]
    SessionInactive {
        /// Which precondition failed.
        reason: String,
    },

    // ── Transient ────────────────────────────────────────────────────

    /// The run was cancelled by the caller.
    #[error("cancelled: {operation}")]
    Cancelled {
        /// Human-readable name of the cancelled operation.
        operation: String,
    },

    /// An operation exceeded its deadline.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Human-readable name of the operation that timed out.
        operation: String,
    },

    // ── Passthrough ──────────────────────────────────────────────────

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraftError {
    /// Whether this error is fatal for the run that raised it.
    ///
    /// Transient errors (cancellation, timeout) are non-terminal at the
    /// session layer; everything else ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GraftError::Cancelled { .. } | GraftError::Timeout { .. })
    }
}

/// A convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GraftError>;
