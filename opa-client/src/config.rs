//! Client configuration.

use std::fmt;

use http::Uri;

use crate::error::{OpaError, OpaResult};
use crate::url::AgentUrl;

/// Environment variable holding the agent base URL.
pub const ENV_AGENT_URL: &str = "OPA_AGENT_URL";
/// Environment variable holding the optional bearer token.
pub const ENV_AGENT_TOKEN: &str = "OPA_AGENT_TOKEN";

/// Static configuration of a [`DecisionClient`](crate::DecisionClient).
#[derive(Clone)]
pub struct ClientConfig {
    agent_url: AgentUrl,
    token: Option<String>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("agent_url", &self.agent_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ClientConfig {
    /// Creates a configuration for the agent at `agent_url`.
    ///
    /// # Errors
    ///
    /// Returns [`OpaError::Configuration`] if the URL is empty, does not use
    /// `http` or `https`, or cannot be parsed.
    pub fn new(agent_url: impl AsRef<str>) -> OpaResult<Self> {
        let raw = agent_url.as_ref().trim();
        if raw.is_empty() {
            return Err(OpaError::configuration("agent URL is not set"));
        }
        if !(raw.starts_with("http://") || raw.starts_with("https://")) {
            return Err(OpaError::configuration(
                "agent URL must start with http:// or https://",
            ));
        }

        let agent_url = AgentUrl::new(raw);
        agent_url
            .as_str()
            .parse::<Uri>()
            .map_err(|err| OpaError::configuration(format!("invalid agent URL: {err}")))?;

        Ok(Self {
            agent_url,
            token: None,
        })
    }

    /// Builds a configuration from `OPA_AGENT_URL` and `OPA_AGENT_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns [`OpaError::Configuration`] if `OPA_AGENT_URL` is missing or invalid.
    pub fn from_env() -> OpaResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`OpaError::Configuration`] if the agent URL is missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> OpaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_AGENT_URL)
            .ok_or_else(|| OpaError::configuration(format!("{ENV_AGENT_URL} is not set")))?;
        let config = Self::new(url)?;

        Ok(match lookup(ENV_AGENT_TOKEN) {
            Some(token) => config.with_token(token),
            None => config,
        })
    }

    /// Sets the bearer token sent with every request. A blank token clears it.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        self
    }

    /// Returns the normalised agent URL.
    #[must_use]
    pub fn agent_url(&self) -> &AgentUrl {
        &self.agent_url
    }

    /// Returns the bearer token, if configured.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_agent_url() {
        let err = ClientConfig::new("  ").expect_err("empty url");
        assert!(matches!(err, OpaError::Configuration { .. }));
    }

    #[test]
    fn rejects_url_without_scheme() {
        let err = ClientConfig::new("localhost:8181").expect_err("missing scheme");
        assert!(matches!(err, OpaError::Configuration { .. }));
    }

    #[test]
    fn normalises_trailing_slashes() {
        let config = ClientConfig::new("http://localhost:8181//").unwrap();
        assert_eq!(config.agent_url().as_str(), "http://localhost:8181/");
    }

    #[test]
    fn blank_token_is_ignored() {
        let config = ClientConfig::new("http://opa").unwrap().with_token(" ");
        assert_eq!(config.token(), None);

        let config = config.with_token("secret");
        assert_eq!(config.token(), Some("secret"));
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn reads_url_and_token_from_lookup() {
        let config = ClientConfig::from_lookup(|key| match key {
            ENV_AGENT_URL => Some("https://opa.internal:8181".to_owned()),
            ENV_AGENT_TOKEN => Some("tkn".to_owned()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.agent_url().as_str(), "https://opa.internal:8181/");
        assert_eq!(config.token(), Some("tkn"));

        let err = ClientConfig::from_lookup(|_| None).expect_err("url required");
        assert!(err.to_string().contains(ENV_AGENT_URL));
    }
}
