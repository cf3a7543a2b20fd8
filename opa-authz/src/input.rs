//! Decision input construction.

use std::sync::Arc;

use bytes::Bytes;
use http::Request;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::CollectError;

/// String-keyed attributes attached to a request by earlier pipeline stages
/// (e.g. a decoded identity token) and by the gate itself.
///
/// Travels in the request's extensions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestAttributes(Map<String, Value>);

impl RequestAttributes {
    /// Creates an empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the attribute stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Stores an attribute, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Adds an attribute and returns the updated set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns the attributes as a JSON map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Builds the request-derived part of the decision input.
///
/// `path` holds the percent-decoded path split on `/` with empty segments
/// dropped, `user` the identity's `sub` (empty when absent), and the identity
/// attribute itself is copied under `identity_attribute`.
#[must_use]
pub fn request_input(
    request: &Request<Bytes>,
    identity_attribute: &str,
    identity_default: &Value,
) -> Map<String, Value> {
    let raw_path = request.uri().path();
    let path = urlencoding::decode(raw_path).map_or_else(|_| raw_path.to_owned(), |p| p.into_owned());
    let segments: Vec<Value> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| Value::String(segment.to_owned()))
        .collect();

    let identity = request
        .extensions()
        .get::<RequestAttributes>()
        .and_then(|attributes| attributes.get(identity_attribute))
        .unwrap_or(identity_default)
        .clone();
    let user = identity
        .get("sub")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let mut input = Map::new();
    input.insert("path".to_owned(), Value::Array(segments));
    input.insert("method".to_owned(), Value::String(request.method().to_string()));
    input.insert("user".to_owned(), Value::String(user));
    input.insert(identity_attribute.to_owned(), identity);
    input
}

/// Source of additional decision input.
pub trait InputCollector: Send + Sync {
    /// Collects input values for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError`] when the collector cannot produce its values.
    fn collect(&self, request: &Request<Bytes>) -> Result<Map<String, Value>, CollectError>;
}

impl<F> InputCollector for F
where
    F: Fn(&Request<Bytes>) -> Result<Map<String, Value>, CollectError> + Send + Sync,
{
    fn collect(&self, request: &Request<Bytes>) -> Result<Map<String, Value>, CollectError> {
        self(request)
    }
}

/// Runs a list of collectors and deep-merges their output under `params`.
///
/// Objects under the same key merge recursively. Any other clash keeps every
/// value: both sides are collected into one array, in collector order. A
/// failing collector is skipped; the others still contribute.
#[derive(Clone, Default)]
pub struct Inputs {
    collectors: Vec<Arc<dyn InputCollector>>,
}

impl std::fmt::Debug for Inputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inputs")
            .field("collectors", &self.collectors.len())
            .finish()
    }
}

impl Inputs {
    /// Creates an empty collector list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a collector.
    pub fn add_collector(&mut self, collector: Arc<dyn InputCollector>) {
        self.collectors.push(collector);
    }

    /// Appends a collector and returns the updated list.
    #[must_use]
    pub fn with_collector(mut self, collector: Arc<dyn InputCollector>) -> Self {
        self.add_collector(collector);
        self
    }

    /// Runs every collector and returns `{"params": merged}`.
    #[must_use]
    pub fn collect(&self, request: &Request<Bytes>) -> Map<String, Value> {
        let mut params = Map::new();
        for collector in &self.collectors {
            match collector.collect(request) {
                Ok(values) => merge_into(&mut params, values),
                Err(err) => debug!(error = %err, "skipping failed input collector"),
            }
        }

        let mut input = Map::new();
        input.insert("params".to_owned(), Value::Object(params));
        input
    }
}

fn merge_into(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, incoming) in source {
        let Some(existing) = target.remove(&key) else {
            target.insert(key, incoming);
            continue;
        };

        let merged = match (existing, incoming) {
            (Value::Object(mut existing), Value::Object(incoming)) => {
                merge_into(&mut existing, incoming);
                Value::Object(existing)
            }
            (existing, incoming) => {
                let mut values = into_list(existing);
                values.extend(into_list(incoming));
                Value::Array(values)
            }
        };
        target.insert(key, merged);
    }
}

fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}
