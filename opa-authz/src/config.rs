//! Gate configuration.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::Request;
use serde_json::{Map, Value, json};

use crate::error::{GateError, GateResult};
use crate::input::Inputs;

/// Produces extra decision input for a request.
pub type InputCallback = Arc<dyn Fn(&Request<Bytes>) -> Map<String, Value> + Send + Sync>;

/// Decides whether a request may pass when the policy does not exist.
pub type PolicyMissingCallback = Arc<dyn Fn(&Map<String, Value>) -> bool + Send + Sync>;

/// Default request attribute receiving the decision of an allowed request.
pub const DEFAULT_RESULT_ATTRIBUTE: &str = "openpolicyagent";
/// Default request attribute holding the caller identity.
pub const DEFAULT_INPUT_ATTRIBUTE: &str = "token";
/// Default result field read as the allow flag.
pub const DEFAULT_ALLOW_FIELD: &str = "allow";

/// Configuration of an [`AuthorizationGate`](crate::AuthorizationGate).
#[derive(Clone)]
pub struct AuthorizationConfig {
    policy: String,
    result_attribute: String,
    input_attribute: String,
    input_attribute_default: Value,
    allow_field: String,
    input_callback: Option<InputCallback>,
    policy_missing_callback: Option<PolicyMissingCallback>,
}

impl fmt::Debug for AuthorizationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationConfig")
            .field("policy", &self.policy)
            .field("result_attribute", &self.result_attribute)
            .field("input_attribute", &self.input_attribute)
            .field("input_attribute_default", &self.input_attribute_default)
            .field("allow_field", &self.allow_field)
            .field("input_callback", &self.input_callback.is_some())
            .field("policy_missing_callback", &self.policy_missing_callback.is_some())
            .finish()
    }
}

impl AuthorizationConfig {
    /// Creates a configuration evaluating the policy at `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Configuration`] when the policy path is empty.
    pub fn new(policy: impl Into<String>) -> GateResult<Self> {
        let policy = policy.into();
        if policy.trim().is_empty() {
            return Err(GateError::configuration("no policy set"));
        }

        Ok(Self {
            policy,
            result_attribute: DEFAULT_RESULT_ATTRIBUTE.to_owned(),
            input_attribute: DEFAULT_INPUT_ATTRIBUTE.to_owned(),
            input_attribute_default: json!({"sub": ""}),
            allow_field: DEFAULT_ALLOW_FIELD.to_owned(),
            input_callback: None,
            policy_missing_callback: None,
        })
    }

    /// Sets the request attribute that receives the decision of an allowed
    /// request. An empty name disables attaching it.
    #[must_use]
    pub fn with_result_attribute(mut self, name: impl Into<String>) -> Self {
        self.result_attribute = name.into();
        self
    }

    /// Sets the request attribute holding the caller identity.
    #[must_use]
    pub fn with_input_attribute(mut self, name: impl Into<String>) -> Self {
        self.input_attribute = name.into();
        self
    }

    /// Sets the identity used when the request carries none.
    #[must_use]
    pub fn with_input_attribute_default(mut self, identity: Value) -> Self {
        self.input_attribute_default = identity;
        self
    }

    /// Sets the result field read as the allow flag.
    #[must_use]
    pub fn with_allow_field(mut self, field: impl Into<String>) -> Self {
        self.allow_field = field.into();
        self
    }

    /// Sets a callback contributing extra input; request-derived keys win on conflict.
    #[must_use]
    pub fn with_input_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Request<Bytes>) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.input_callback = Some(Arc::new(callback));
        self
    }

    /// Uses a set of input collectors as the extra input source.
    #[must_use]
    pub fn with_inputs(self, inputs: Inputs) -> Self {
        self.with_input_callback(move |request| inputs.collect(request))
    }

    /// Sets the override consulted when the policy does not exist.
    #[must_use]
    pub fn with_policy_missing_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        self.policy_missing_callback = Some(Arc::new(callback));
        self
    }

    /// Returns the policy path.
    #[must_use]
    pub fn policy(&self) -> &str {
        &self.policy
    }

    /// Returns the result attribute name, empty when disabled.
    #[must_use]
    pub fn result_attribute(&self) -> &str {
        &self.result_attribute
    }

    /// Returns the identity attribute name.
    #[must_use]
    pub fn input_attribute(&self) -> &str {
        &self.input_attribute
    }

    /// Returns the identity used when the request carries none.
    #[must_use]
    pub fn input_attribute_default(&self) -> &Value {
        &self.input_attribute_default
    }

    /// Returns the allow field name.
    #[must_use]
    pub fn allow_field(&self) -> &str {
        &self.allow_field
    }

    /// Returns the extra-input callback, if any.
    #[must_use]
    pub fn input_callback(&self) -> Option<&InputCallback> {
        self.input_callback.as_ref()
    }

    /// Returns the policy-missing override, if any.
    #[must_use]
    pub fn policy_missing_callback(&self) -> Option<&PolicyMissingCallback> {
        self.policy_missing_callback.as_ref()
    }
}
