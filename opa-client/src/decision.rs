//! Decision results parsed from the agent's response envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OpaError, OpaResult, PolicyNotFound};
use crate::provenance::Provenance;

/// Outcome of evaluating a policy or query.
///
/// Only ever built from a body that carries a non-null `result`; see
/// [`DecisionEnvelope::into_decision`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionResult {
    #[serde(skip_serializing_if = "String::is_empty")]
    decision_id: String,
    result: Value,
    #[serde(skip_serializing_if = "Map::is_empty")]
    metrics: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    explanation: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provenance: Option<Provenance>,
}

impl DecisionResult {
    /// Returns the decision id, empty if the agent sent none.
    #[must_use]
    pub fn decision_id(&self) -> &str {
        &self.decision_id
    }

    /// Returns the full result document.
    #[must_use]
    pub fn result(&self) -> &Value {
        &self.result
    }

    /// Returns the value stored under `name` in an object result.
    ///
    /// `None` when the result is not an object or has no such key.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.result.as_object().and_then(|result| result.get(name))
    }

    /// Alias of [`DecisionResult::get`].
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }

    /// Returns true when `name` holds a non-empty value.
    ///
    /// `null`, `false`, `0`, `""`, `[]` and `{}` count as empty.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| !is_empty_value(value))
    }

    /// Returns the metrics reported by the agent.
    #[must_use]
    pub fn metrics(&self) -> &Map<String, Value> {
        &self.metrics
    }

    /// Returns the explanation trace reported by the agent.
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

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

/// Decoded response body before the `result` invariant is applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionEnvelope {
    #[serde(default)]
    decision_id: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    metrics: Option<Map<String, Value>>,
    #[serde(default)]
    explanation: Option<Vec<Value>>,
    #[serde(default)]
    provenance: Option<Provenance>,
}

impl DecisionEnvelope {
    /// Decodes a success body. A blank body decodes as `{}`.
    ///
    /// # Errors
    ///
    /// Returns [`OpaError::Decode`] when the body is not a JSON object of the
    /// expected shape.
    pub fn from_slice(body: &[u8]) -> OpaResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_json::from_slice(body).map_err(|err| OpaError::decode(format!("decision body: {err}")))
    }

    /// Returns true when the body carried a non-null `result`.
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// Returns the provenance carried by the body.
    #[must_use]
    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    /// Applies the `result` invariant.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyNotFound`] carrying the rest of the envelope when no
    /// `result`, or a `null` one, was present.
    pub fn into_decision(self, target: &str) -> Result<DecisionResult, PolicyNotFound> {
        let decision_id = self.decision_id.unwrap_or_default();
        let metrics = self.metrics.unwrap_or_default();
        let explanation = self.explanation.unwrap_or_default();

        match self.result {
            Some(result) => Ok(DecisionResult {
                decision_id,
                result,
                metrics,
                explanation,
                provenance: self.provenance,
            }),
            None => Err(PolicyNotFound::new(
                target,
                decision_id,
                metrics,
                explanation,
                self.provenance,
            )),
        }
    }

    /// Extracts the provenance, tolerating a body without `result`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyNotFound`] when the body carried no provenance.
    pub fn into_provenance(mut self, target: &str) -> Result<Provenance, PolicyNotFound> {
        match self.provenance.take() {
            Some(provenance) => Ok(provenance),
            None => Err(PolicyNotFound::new(
                target,
                self.decision_id.unwrap_or_default(),
                self.metrics.unwrap_or_default(),
                self.explanation.unwrap_or_default(),
                None,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: &Value) -> DecisionEnvelope {
        DecisionEnvelope::from_slice(&serde_json::to_vec(value).unwrap()).unwrap()
    }

    #[test]
    fn decision_exposes_result_fields() {
        let decision = decode(&json!({
            "decision_id": "d-1",
            "result": {"allow": true, "reasons": []}
        }))
        .into_decision("auth/api")
        .unwrap();

        assert_eq!(decision.decision_id(), "d-1");
        assert_eq!(decision.get("allow"), Some(&json!(true)));
        assert_eq!(decision.by_name("missing"), None);
        assert!(decision.has("allow"));
        assert!(!decision.has("reasons"));
        assert!(decision.metrics().is_empty());
        assert!(decision.explanation().is_empty());
        assert!(decision.provenance().is_none());
    }

    #[test]
    fn empty_result_is_still_a_decision() {
        for result in [json!({}), json!([]), json!(false)] {
            let envelope = decode(&json!({ "result": result }));
            assert!(envelope.has_result());
            let decision = envelope.into_decision("p").unwrap();
            assert_eq!(decision.result(), &result);
            assert_eq!(decision.get("allow"), None);
        }
    }

    #[test]
    fn null_result_is_policy_not_found() {
        let envelope = decode(&json!({"decision_id": "d-3", "result": null}));
        assert!(!envelope.has_result());

        let err = envelope.into_decision("auth/api").expect_err("null result");
        assert_eq!(err.target(), "auth/api");
        assert_eq!(err.decision_id(), "d-3");
    }

    #[test]
    fn missing_result_is_policy_not_found() {
        let err = decode(&json!({
            "decision_id": "d-2",
            "metrics": {"timer_rego_query_eval_ns": 12}
        }))
        .into_decision("missing/policy")
        .expect_err("no result");

        assert_eq!(err.target(), "missing/policy");
        assert_eq!(err.decision_id(), "d-2");
        assert_eq!(err.metrics()["timer_rego_query_eval_ns"], json!(12));
        assert_eq!(err.to_string(), "policy not found: `missing/policy`");
    }

    #[test]
    fn blank_body_decodes_as_empty_envelope() {
        let envelope = DecisionEnvelope::from_slice(b"  \n").unwrap();
        assert!(!envelope.has_result());
        assert!(envelope.into_decision("p").is_err());
    }

    #[test]
    fn non_json_body_is_a_decode_error() {
        let err = DecisionEnvelope::from_slice(b"not json").unwrap_err();
        assert!(matches!(err, OpaError::Decode { .. }));

        let err = DecisionEnvelope::from_slice(b"[1, 2]").unwrap_err();
        assert!(matches!(err, OpaError::Decode { .. }));
    }

    #[test]
    fn provenance_only_body_yields_provenance() {
        let envelope = decode(&json!({
            "provenance": {
                "version": "0.15.1",
                "build_commit": "62bb63d",
                "build_timestamp": "2019-11-18T15:22:47Z",
                "build_hostname": "1173a3a0b052"
            }
        }));
        assert!(envelope.provenance().is_some());

        let provenance = envelope.into_provenance("").unwrap();
        assert_eq!(provenance.version(), "0.15.1");
    }

    #[test]
    fn missing_provenance_is_policy_not_found() {
        let err = decode(&json!({"result": {}})).into_provenance("").unwrap_err();
        assert!(err.provenance().is_none());
    }

    #[test]
    fn decision_serializes_to_wire_shape() {
        let wire = json!({"decision_id": "d-3", "result": {"allow": false}});
        let decision = decode(&wire).into_decision("p").unwrap();
        assert_eq!(serde_json::to_value(&decision).unwrap(), wire);
    }
}
