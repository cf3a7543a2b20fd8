//! URL construction for the OPA REST API.

use std::fmt;

/// API version segment prefixed to every endpoint.
pub const API_VERSION: &str = "v1";

/// Optional diagnostics the agent is asked to include in a decision.
///
/// Rendered into the query string in a fixed order (`explain`, `metrics`,
/// `instrument`, `provenance`) so identical flags always yield identical URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryFlags {
    /// Request a full explanation trace (`explain=full`).
    pub explain: bool,
    /// Request performance metrics (`metrics=true`).
    pub metrics: bool,
    /// Request instrumentation counters (`instrument=true`).
    pub instrument: bool,
    /// Request agent provenance (`provenance=true`).
    pub provenance: bool,
}

impl QueryFlags {
    /// Flags with every option disabled.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            explain: false,
            metrics: false,
            instrument: false,
            provenance: false,
        }
    }

    /// Builds flags from the four positional booleans used by the decision API.
    #[must_use]
    pub const fn new(explain: bool, metrics: bool, instrument: bool, provenance: bool) -> Self {
        Self {
            explain,
            metrics,
            instrument,
            provenance,
        }
    }

    /// Enables the explanation trace.
    #[must_use]
    pub fn with_explain(mut self) -> Self {
        self.explain = true;
        self
    }

    /// Enables metrics collection.
    #[must_use]
    pub fn with_metrics(mut self) -> Self {
        self.metrics = true;
        self
    }

    /// Enables instrumentation.
    #[must_use]
    pub fn with_instrument(mut self) -> Self {
        self.instrument = true;
        self
    }

    /// Enables provenance reporting.
    #[must_use]
    pub fn with_provenance(mut self) -> Self {
        self.provenance = true;
        self
    }

    /// Returns the encoded query string without the leading `?`, or `None`
    /// when no flag is set.
    #[must_use]
    pub fn query_string(self) -> Option<String> {
        let params: Vec<&str> = [
            (self.explain, "explain=full"),
            (self.metrics, "metrics=true"),
            (self.instrument, "instrument=true"),
            (self.provenance, "provenance=true"),
        ]
        .into_iter()
        .filter_map(|(enabled, param)| enabled.then_some(param))
        .collect();

        if params.is_empty() {
            None
        } else {
            Some(params.join("&"))
        }
    }

    /// Appends the query string to `url`, leaving it untouched when no flag is set.
    #[must_use]
    pub fn decorate(self, url: &str) -> String {
        match self.query_string() {
            Some(query) => format!("{url}?{query}"),
            None => url.to_owned(),
        }
    }
}

/// Normalised base URL of an agent, always ending in exactly one `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentUrl {
    base: String,
}

impl AgentUrl {
    /// Normalises the supplied base URL.
    ///
    /// Surrounding whitespace and every trailing `/` are removed before a
    /// single `/` is appended. No further validation happens here.
    #[must_use]
    pub fn new(base: &str) -> Self {
        let trimmed = base.trim().trim_end_matches('/');
        Self {
            base: format!("{trimmed}/"),
        }
    }

    /// Returns the normalised base URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// `{base}v1/data/{name}`; the root data document when `name` is empty.
    #[must_use]
    pub fn data(&self, name: &str) -> String {
        format!("{}data/{}", self.api_root(), name.trim_start_matches('/'))
    }

    /// `{base}v1/query`.
    #[must_use]
    pub fn query(&self) -> String {
        format!("{}query", self.api_root())
    }

    /// `{base}v1/policies/{name}`.
    #[must_use]
    pub fn policy(&self, name: &str) -> String {
        format!("{}policies/{}", self.api_root(), name.trim_start_matches('/'))
    }

    fn api_root(&self) -> String {
        format!("{}{API_VERSION}/", self.base)
    }
}

impl fmt::Display for AgentUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_is_normalised_to_single_slash() {
        assert_eq!(AgentUrl::new("http://opa:8181").as_str(), "http://opa:8181/");
        assert_eq!(AgentUrl::new("http://opa:8181///").as_str(), "http://opa:8181/");
        assert_eq!(AgentUrl::new(" http://opa:8181/ ").as_str(), "http://opa:8181/");
    }

    #[test]
    fn builds_endpoint_urls() {
        let url = AgentUrl::new("http://opa:8181/");
        assert_eq!(url.data("auth/api"), "http://opa:8181/v1/data/auth/api");
        assert_eq!(url.data(""), "http://opa:8181/v1/data/");
        assert_eq!(url.data("/auth"), "http://opa:8181/v1/data/auth");
        assert_eq!(url.query(), "http://opa:8181/v1/query");
        assert_eq!(url.policy("some/policy"), "http://opa:8181/v1/policies/some/policy");
    }

    #[test]
    fn flags_render_in_fixed_order() {
        let flags = QueryFlags::new(true, true, true, false);
        assert_eq!(
            flags.query_string().as_deref(),
            Some("explain=full&metrics=true&instrument=true")
        );

        let flags = QueryFlags::none().with_provenance().with_explain();
        assert_eq!(flags.query_string().as_deref(), Some("explain=full&provenance=true"));
    }

    #[test]
    fn no_flags_leave_url_untouched() {
        assert_eq!(QueryFlags::none().query_string(), None);
        assert_eq!(
            QueryFlags::default().decorate("http://opa/v1/query"),
            "http://opa/v1/query"
        );
        assert_eq!(
            QueryFlags::none().with_metrics().decorate("http://opa/v1/policies/p"),
            "http://opa/v1/policies/p?metrics=true"
        );
    }
}
