//! Errors surfaced by the authorization gate.

use opa_client::{OpaError, PolicyNotFound};
use thiserror::Error;

/// Result alias for gate operations.
pub type GateResult<T> = Result<T, GateError>;

/// Errors that abort the request pipeline.
///
/// A denied request is not an error; see [`GateVerdict`](crate::GateVerdict).
#[derive(Debug, Error)]
pub enum GateError {
    /// The gate cannot work as configured: an unusable setting, or a policy
    /// that does not exist while no override handler is set.
    #[error("authorization gate not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
        /// Partial answer from the agent when the policy is missing.
        #[source]
        source: Option<PolicyNotFound>,
    },

    /// The decision client failed (agent unavailable or server error).
    #[error(transparent)]
    Client(#[from] OpaError),
}

impl GateError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
            source: None,
        }
    }

    /// Configuration error for a missing policy with no override handler.
    #[must_use]
    pub fn policy_missing(missing: PolicyNotFound) -> Self {
        Self::Configuration {
            reason: format!(
                "policy `{}` not found and no override handler is configured",
                missing.target()
            ),
            source: Some(missing),
        }
    }

    /// Returns the agent's partial answer when the policy was missing.
    #[must_use]
    pub fn policy_not_found(&self) -> Option<&PolicyNotFound> {
        match self {
            Self::Configuration { source, .. } => source.as_ref(),
            Self::Client(_) => None,
        }
    }
}

/// Failure of a single input collector.
#[derive(Debug, Error)]
#[error("input collection failed: {reason}")]
pub struct CollectError {
    reason: String,
}

impl CollectError {
    /// Creates a collector failure with the supplied reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the failure reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}
