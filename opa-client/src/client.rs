//! Decision client orchestrating URL construction, dispatch and classification.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::decision::{DecisionEnvelope, DecisionResult};
use crate::error::{OpaError, OpaResult, ServerError};
use crate::http_client::HyperTransport;
use crate::provenance::Provenance;
use crate::transport::{Transport, TransportRequest};
use crate::url::{AgentUrl, QueryFlags};

const JSON: &str = "application/json";
const TEXT: &str = "text/plain";

/// Successful reply to an exchange, before any decoding.
#[derive(Debug)]
enum Reply {
    Body(Bytes),
    NoContent,
}

#[derive(Serialize)]
struct PolicyPayload<'a, I: ?Sized> {
    input: &'a I,
}

#[derive(Serialize)]
struct QueryPayload<'a, I: ?Sized> {
    query: &'a str,
    input: &'a I,
}

/// Client for the agent's data, query and policy APIs.
///
/// Holds only immutable configuration, so one instance can be shared across
/// tasks behind an [`Arc`] as long as the transport allows it.
#[derive(Clone)]
pub struct DecisionClient {
    transport: Arc<dyn Transport>,
    agent_url: AgentUrl,
    authorization: Option<HeaderValue>,
}

impl fmt::Debug for DecisionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionClient")
            .field("agent_url", &self.agent_url.as_str())
            .field("authenticated", &self.authorization.is_some())
            .finish_non_exhaustive()
    }
}

impl DecisionClient {
    /// Creates a client using the default [`HyperTransport`].
    ///
    /// # Errors
    ///
    /// Returns [`OpaError::Configuration`] if the bearer token cannot be used
    /// as a header value.
    pub fn new(config: ClientConfig) -> OpaResult<Self> {
        Self::with_transport(config, Arc::new(HyperTransport::default()))
    }

    /// Creates a client sending through the supplied transport.
    ///
    /// # Errors
    ///
    /// Returns [`OpaError::Configuration`] if the bearer token cannot be used
    /// as a header value.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> OpaResult<Self> {
        let authorization = config
            .token()
            .map(|token| {
                let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|err| {
                    OpaError::configuration(format!("invalid bearer token: {err}"))
                })?;
                value.set_sensitive(true);
                Ok::<_, OpaError>(value)
            })
            .transpose()?;

        Ok(Self {
            transport,
            agent_url: config.agent_url().clone(),
            authorization,
        })
    }

    /// Returns the agent URL the client talks to.
    #[must_use]
    pub fn agent_url(&self) -> &AgentUrl {
        &self.agent_url
    }

    /// Fetches the agent's build and bundle metadata.
    ///
    /// A body holding only `provenance` is accepted; no `result` is required.
    ///
    /// # Errors
    ///
    /// Returns [`OpaError::PolicyNotFound`] when the agent sends no provenance,
    /// or any transport/server error from the exchange.
    pub async fn agent_version(&self) -> OpaResult<Provenance> {
        let url = QueryFlags::none()
            .with_provenance()
            .decorate(&self.agent_url.data(""));

        let envelope = match self.execute(Method::GET, &url, JSON, Bytes::new()).await? {
            Reply::Body(body) => DecisionEnvelope::from_slice(&body)?,
            Reply::NoContent => DecisionEnvelope::default(),
        };
        Ok(envelope.into_provenance("")?)
    }

    /// Evaluates the policy document at `name` against `input`.
    ///
    /// # Errors
    ///
    /// Returns [`OpaError::PolicyNotFound`] when the agent answers without a
    /// `result`, [`OpaError::Server`] when it reports an error, and
    /// [`OpaError::AgentUnavailable`] when it cannot be reached.
    pub async fn policy<I>(&self, name: &str, input: &I, flags: QueryFlags) -> OpaResult<DecisionResult>
    where
        I: Serialize + ?Sized + Sync,
    {
        let url = flags.decorate(&self.agent_url.data(name));
        let body = encode_json(&PolicyPayload { input })?;

        let reply = self.execute(Method::POST, &url, JSON, body).await?;
        decode_decision(reply, name)
    }

    /// Runs an ad-hoc Rego query against `input`.
    ///
    /// # Errors
    ///
    /// Same as [`DecisionClient::policy`].
    pub async fn query<I>(&self, query: &str, input: &I, flags: QueryFlags) -> OpaResult<DecisionResult>
    where
        I: Serialize + ?Sized + Sync,
    {
        let url = flags.decorate(&self.agent_url.query());
        let body = encode_json(&QueryPayload { query, input })?;

        let reply = self.execute(Method::POST, &url, JSON, body).await?;
        decode_decision(reply, query)
    }

    /// Creates or replaces the data document at `name` with raw JSON `content`.
    ///
    /// # Errors
    ///
    /// Returns [`OpaError::Server`] when the agent rejects the document and
    /// [`OpaError::AgentUnavailable`] when it cannot be reached.
    pub async fn data_update(&self, name: &str, content: impl Into<Bytes>) -> OpaResult<()> {
        let url = self.agent_url.data(name);
        self.execute(Method::PUT, &url, JSON, content.into()).await?;
        Ok(())
    }

    /// Creates or replaces the Rego module `name` with `content`.
    ///
    /// Returns the metrics the agent reported, empty unless `metrics` was
    /// requested.
    ///
    /// # Errors
    ///
    /// Returns [`OpaError::Server`] when the module fails to compile and
    /// [`OpaError::AgentUnavailable`] when the agent cannot be reached.
    pub async fn policy_update(
        &self,
        name: &str,
        content: impl Into<Bytes>,
        metrics: bool,
    ) -> OpaResult<Map<String, Value>> {
        let flags = QueryFlags {
            metrics,
            ..QueryFlags::none()
        };
        let url = flags.decorate(&self.agent_url.policy(name));

        match self.execute(Method::PUT, &url, TEXT, content.into()).await? {
            Reply::Body(body) => Ok(decode_metrics(&body)),
            Reply::NoContent => Ok(Map::new()),
        }
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        content_type: &'static str,
        body: Bytes,
    ) -> OpaResult<Reply> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(authorization) = &self.authorization {
            headers.insert(AUTHORIZATION, authorization.clone());
        }

        debug!(%method, url, "sending request to OPA agent");
        let request = TransportRequest::new(method, url)
            .with_headers(headers)
            .with_body(body);

        let response = self.transport.send(request).await.map_err(|source| {
            error!(url, error = %source, "OPA agent unavailable");
            OpaError::AgentUnavailable {
                url: url.to_owned(),
                source,
            }
        })?;

        classify(response.status(), response.into_body())
    }
}

fn classify(status: StatusCode, body: Bytes) -> OpaResult<Reply> {
    if status == StatusCode::NO_CONTENT {
        return Ok(Reply::NoContent);
    }
    if status.is_success() {
        return Ok(Reply::Body(body));
    }

    let err = ServerError::from_body(status, &body)?;
    warn!(%status, opa_code = err.opa_code(), message = err.message(), "OPA agent reported an error");
    Err(err.into())
}

fn decode_decision(reply: Reply, target: &str) -> OpaResult<DecisionResult> {
    let envelope = match reply {
        Reply::Body(body) => DecisionEnvelope::from_slice(&body)?,
        Reply::NoContent => DecisionEnvelope::default(),
    };
    Ok(envelope.into_decision(target)?)
}

// Policy uploads answer `{}` or `{"metrics": {...}}`; anything else carries no metrics.
fn decode_metrics(body: &[u8]) -> Map<String, Value> {
    let value = match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "ignoring undecodable policy upload reply");
            return Map::new();
        }
    };

    match value {
        Value::Object(mut fields) => match fields.remove("metrics") {
            Some(Value::Object(metrics)) => metrics,
            _ => Map::new(),
        },
        _ => Map::new(),
    }
}

fn encode_json<T: Serialize + ?Sized>(payload: &T) -> OpaResult<Bytes> {
    serde_json::to_vec(payload)
        .map(Bytes::from)
        .map_err(|err| OpaError::invalid_request(format!("failed to encode request body: {err}")))
}
