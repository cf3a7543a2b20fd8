//! Request gate that asks the agent whether a request may proceed.

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use opa_client::{DecisionClient, DecisionResult, OpaError, QueryFlags};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::AuthorizationConfig;
use crate::error::{GateError, GateResult};
use crate::input::{RequestAttributes, request_input};

/// Next stage of the request pipeline.
#[async_trait]
pub trait NextHandler: Send + Sync {
    /// Handles a request the gate let through.
    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes>;
}

/// Outcome of evaluating the gate's policy for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    /// The policy's allow field was `true`.
    Allowed {
        /// Decision returned by the agent.
        decision: DecisionResult,
    },
    /// The policy does not exist and the override callback let the request through.
    Overridden,
    /// The request must be rejected.
    Denied {
        /// Decision returned by the agent, absent when the policy does not exist.
        decision: Option<DecisionResult>,
    },
}

impl GateVerdict {
    /// Returns true when the request may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. } | Self::Overridden)
    }

    /// Returns true when the request must be rejected.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// Returns the agent's decision, if one was produced.
    #[must_use]
    pub fn decision(&self) -> Option<&DecisionResult> {
        match self {
            Self::Allowed { decision } => Some(decision),
            Self::Denied { decision } => decision.as_ref(),
            Self::Overridden => None,
        }
    }
}

/// Authorization gate placed in front of a [`NextHandler`].
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    client: DecisionClient,
    config: AuthorizationConfig,
}

impl AuthorizationGate {
    /// Creates a gate evaluating `config`'s policy through `client`.
    #[must_use]
    pub fn new(client: DecisionClient, config: AuthorizationConfig) -> Self {
        Self { client, config }
    }

    /// Returns the gate configuration.
    #[must_use]
    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    /// Builds the decision input for `request`.
    ///
    /// Extra input from the configured callback sits underneath the
    /// request-derived keys, which win on conflict.
    #[must_use]
    pub fn build_input(&self, request: &Request<Bytes>) -> Map<String, Value> {
        let mut input = self
            .config
            .input_callback()
            .map(|callback| callback(request))
            .unwrap_or_default();

        input.extend(request_input(
            request,
            self.config.input_attribute(),
            self.config.input_attribute_default(),
        ));
        input
    }

    /// Evaluates the policy against `input`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Configuration`] when the policy does not exist and
    /// no override callback is configured, and [`GateError::Client`] for any
    /// other client failure.
    pub async fn evaluate(&self, input: &Map<String, Value>) -> GateResult<GateVerdict> {
        let policy = self.config.policy();
        match self.client.policy(policy, input, QueryFlags::none()).await {
            Ok(decision) => {
                let allowed = decision
                    .get(self.config.allow_field())
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if allowed {
                    debug!(policy, decision_id = decision.decision_id(), "request allowed");
                    Ok(GateVerdict::Allowed { decision })
                } else {
                    info!(policy, decision_id = decision.decision_id(), "request denied");
                    Ok(GateVerdict::Denied {
                        decision: Some(decision),
                    })
                }
            }
            Err(OpaError::PolicyNotFound(missing)) => {
                warn!(policy, "authorization policy not found");
                let Some(callback) = self.config.policy_missing_callback() else {
                    return Err(GateError::policy_missing(missing));
                };

                if callback(input) {
                    warn!(policy, "missing policy overridden, request allowed");
                    Ok(GateVerdict::Overridden)
                } else {
                    info!(policy, "missing policy not overridden, request denied");
                    Ok(GateVerdict::Denied { decision: None })
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Gates `request`: forwards it to `next` when allowed, answers
    /// `403 Forbidden` with an empty body when denied.
    ///
    /// On allow the decision result is stored in the request's
    /// [`RequestAttributes`] under the configured result attribute, and the
    /// full [`DecisionResult`] is inserted into the request extensions.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`AuthorizationGate::evaluate`].
    pub async fn process<H>(&self, mut request: Request<Bytes>, next: &H) -> GateResult<Response<Bytes>>
    where
        H: NextHandler + ?Sized,
    {
        let input = self.build_input(&request);
        match self.evaluate(&input).await? {
            GateVerdict::Allowed { decision } => {
                self.attach(&mut request, decision);
                Ok(next.handle(request).await)
            }
            GateVerdict::Overridden => Ok(next.handle(request).await),
            GateVerdict::Denied { .. } => Ok(forbidden()),
        }
    }

    fn attach(&self, request: &mut Request<Bytes>, decision: DecisionResult) {
        let attribute = self.config.result_attribute();
        if !attribute.is_empty() {
            let extensions = request.extensions_mut();
            let mut attributes = extensions.remove::<RequestAttributes>().unwrap_or_default();
            attributes.insert(attribute, decision.result().clone());
            extensions.insert(attributes);
        }
        request.extensions_mut().insert(decision);
    }
}

fn forbidden() -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::FORBIDDEN;
    response
}
