//! Error taxonomy for agent exchanges.
//!
//! Three failure kinds are kept strictly apart: the agent could not be
//! reached ([`OpaError::AgentUnavailable`]), the agent reported a problem
//! ([`OpaError::Server`]), or the agent answered successfully without a
//! decision ([`OpaError::PolicyNotFound`]).

use http::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::provenance::Provenance;
use crate::transport::TransportError;

/// Result alias used by the decision client.
pub type OpaResult<T> = Result<T, OpaError>;

/// Errors surfaced by the decision client.
#[derive(Debug, Error)]
pub enum OpaError {
    /// The transport could not complete the exchange at all.
    #[error("OPA agent unavailable at {url}: {source}")]
    AgentUnavailable {
        /// URL of the failed request.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The agent reported a compile, evaluation or configuration error.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The agent answered successfully but produced no `result`.
    #[error(transparent)]
    PolicyNotFound(#[from] PolicyNotFound),

    /// A non-success status arrived without a usable `{code, message}` envelope.
    #[error("malformed OPA error response (HTTP {status}): {reason}")]
    MalformedErrorBody {
        /// Status that carried the body.
        status: StatusCode,
        /// Why the envelope could not be used.
        reason: String,
    },

    /// A success body could not be decoded.
    #[error("failed to decode OPA response: {reason}")]
    Decode {
        /// Decoder context.
        reason: String,
    },

    /// The client is misconfigured.
    #[error("OPA client not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The request could not be encoded.
    #[error("invalid OPA request: {reason}")]
    InvalidRequest {
        /// Reason describing why the request could not be built.
        reason: String,
    },
}

impl OpaError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for decode failures.
    #[must_use]
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for invalid requests.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Returns true when the agent could not be reached.
    #[must_use]
    pub fn is_agent_unavailable(&self) -> bool {
        matches!(self, Self::AgentUnavailable { .. })
    }

    /// Returns true when the agent produced no decision.
    #[must_use]
    pub fn is_policy_not_found(&self) -> bool {
        matches!(self, Self::PolicyNotFound(_))
    }

    /// Returns the server error, if the agent reported one.
    #[must_use]
    pub fn as_server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Server(err) => Some(err),
            _ => None,
        }
    }
}

/// Error reported by the agent through its `{code, message, errors}` envelope.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{opa_code}: {message}")]
pub struct ServerError {
    status: StatusCode,
    opa_code: String,
    message: String,
    errors: Vec<Map<String, Value>>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<Vec<Map<String, Value>>>,
}

impl ServerError {
    /// Decodes an error envelope received with `status`.
    ///
    /// # Errors
    ///
    /// Returns [`OpaError::MalformedErrorBody`] when the body is not JSON or
    /// lacks a non-empty `code` or `message`.
    pub fn from_body(status: StatusCode, body: &[u8]) -> OpaResult<Self> {
        let malformed = |reason: String| OpaError::MalformedErrorBody { status, reason };

        let envelope: ErrorEnvelope = serde_json::from_slice(body)
            .map_err(|err| malformed(format!("error envelope is not valid JSON: {err}")))?;

        let opa_code = envelope
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| malformed("error envelope is missing `code`".to_owned()))?;
        let message = envelope
            .message
            .filter(|message| !message.is_empty())
            .ok_or_else(|| malformed("error envelope is missing `message`".to_owned()))?;

        Ok(Self {
            status,
            opa_code,
            message,
            errors: envelope.errors.unwrap_or_default(),
        })
    }

    /// Returns the HTTP status that carried the error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the OPA error code (e.g. `invalid_parameter`).
    #[must_use]
    pub fn opa_code(&self) -> &str {
        &self.opa_code
    }

    /// Returns the human-readable message reported by the agent.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the nested compiler/evaluator diagnostics as reported.
    #[must_use]
    pub fn errors(&self) -> &[Map<String, Value>] {
        &self.errors
    }

    /// Returns a typed view of the nested diagnostics, skipping entries that
    /// do not match the documented shape.
    #[must_use]
    pub fn details(&self) -> Vec<ErrorDetail> {
        self.errors
            .iter()
            .filter_map(|entry| serde_json::from_value(Value::Object(entry.clone())).ok())
            .collect()
    }
}

/// One compiler or evaluator diagnostic from [`ServerError::errors`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    /// Diagnostic code (e.g. `rego_parse_error`).
    #[serde(default)]
    pub code: String,
    /// Diagnostic message.
    #[serde(default)]
    pub message: String,
    /// Source location, when the agent reports one.
    #[serde(default)]
    pub location: Option<ErrorLocation>,
}

/// Position of a diagnostic inside a Rego module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorLocation {
    /// Module file name.
    #[serde(default)]
    pub file: String,
    /// 1-based row.
    #[serde(default)]
    pub row: u64,
    /// 1-based column.
    #[serde(default)]
    pub col: u64,
}

/// Successful answer without a `result`: the named document does not exist.
///
/// Carries whatever else the agent sent so callers can still inspect it.
#[derive(Debug, Clone, PartialEq, Default, Error)]
#[error("policy not found: `{target}`")]
pub struct PolicyNotFound {
    target: String,
    decision_id: String,
    metrics: Map<String, Value>,
    explanation: Vec<Value>,
    provenance: Option<Provenance>,
}

impl PolicyNotFound {
    pub(crate) fn new(
        target: impl Into<String>,
        decision_id: String,
        metrics: Map<String, Value>,
        explanation: Vec<Value>,
        provenance: Option<Provenance>,
    ) -> Self {
        Self {
            target: target.into(),
            decision_id,
            metrics,
            explanation,
            provenance,
        }
    }

    /// Returns the policy path or query that produced no result.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the decision id, empty if the agent sent none.
    #[must_use]
    pub fn decision_id(&self) -> &str {
        &self.decision_id
    }

    /// Returns the metrics reported alongside the empty answer.
    #[must_use]
    pub fn metrics(&self) -> &Map<String, Value> {
        &self.metrics
    }

    /// Returns the explanation trace reported alongside the empty answer.
    #[must_use]
    pub fn explanation(&self) -> &[Value] {
        &self.explanation
    }

    /// Returns the agent provenance, if it was requested and sent.
    #[must_use]
    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }
}
