use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use opa_authz::{
    AuthorizationConfig, AuthorizationGate, CollectError, GateError, GateVerdict, Inputs,
    NextHandler, RequestAttributes,
};
use opa_client::testing::FakeTransport;
use opa_client::{ClientConfig, DecisionClient, DecisionResult, OpaError, TransportError};
use serde_json::{Map, Value, json};

#[derive(Default)]
struct RecordingHandler {
    calls: AtomicUsize,
    seen: Mutex<Option<Request<Bytes>>>,
}

#[async_trait]
impl NextHandler for RecordingHandler {
    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock().unwrap() = Some(request);
        Response::new(Bytes::from_static(b"handled"))
    }
}

impl RecordingHandler {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn take_request(&self) -> Request<Bytes> {
        self.seen.lock().unwrap().take().expect("handler was called")
    }
}

fn gate(transport: &Arc<FakeTransport>, config: AuthorizationConfig) -> AuthorizationGate {
    let client_config = ClientConfig::new("http://opa:8181").unwrap();
    let client = DecisionClient::with_transport(client_config, transport.clone()).unwrap();
    AuthorizationGate::new(client, config)
}

fn config() -> AuthorizationConfig {
    AuthorizationConfig::new("auth/api").unwrap()
}

fn request_as(user: &str) -> Request<Bytes> {
    let mut request = Request::builder()
        .method("GET")
        .uri("/reports/2024")
        .body(Bytes::new())
        .unwrap();
    request
        .extensions_mut()
        .insert(RequestAttributes::new().with("token", json!({"sub": user})));
    request
}

fn sent_input(transport: &FakeTransport) -> Value {
    let body: Value = serde_json::from_slice(transport.last_request().body()).unwrap();
    body["input"].clone()
}

fn tenant(_: &Request<Bytes>) -> Result<Map<String, Value>, CollectError> {
    let mut values = Map::new();
    values.insert("tenant".to_owned(), json!("acme"));
    Ok(values)
}

#[tokio::test]
async fn allowed_request_reaches_next_stage_with_decision_attached() {
    let transport = FakeTransport::new();
    transport.respond_json(
        StatusCode::OK,
        &json!({"decision_id": "d-1", "result": {"allow": true, "reason": "owner"}}),
    );
    let handler = RecordingHandler::default();

    let response = gate(&transport, config())
        .process(request_as("alice"), &handler)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(handler.calls(), 1);
    assert_eq!(
        transport.last_request().url(),
        "http://opa:8181/v1/data/auth/api"
    );
    assert_eq!(
        sent_input(&transport),
        json!({
            "path": ["reports", "2024"],
            "method": "GET",
            "user": "alice",
            "token": {"sub": "alice"}
        })
    );

    let forwarded = handler.take_request();
    let attributes = forwarded.extensions().get::<RequestAttributes>().unwrap();
    assert_eq!(
        attributes.get("openpolicyagent"),
        Some(&json!({"allow": true, "reason": "owner"}))
    );
    assert_eq!(
        forwarded
            .extensions()
            .get::<DecisionResult>()
            .map(DecisionResult::decision_id),
        Some("d-1")
    );
}

#[tokio::test]
async fn denied_request_gets_empty_forbidden_response() {
    let transport = FakeTransport::new();
    transport.respond_json(StatusCode::OK, &json!({"result": {"allow": false}}));
    let handler = RecordingHandler::default();

    let response = gate(&transport, config())
        .process(request_as("mallory"), &handler)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.body().is_empty());
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn non_boolean_allow_field_denies() {
    let transport = FakeTransport::new();
    transport.respond_json(StatusCode::OK, &json!({"result": {"allow": "yes"}}));

    let input = Map::new();
    let verdict = gate(&transport, config()).evaluate(&input).await.unwrap();
    assert!(verdict.is_denied());
    assert!(verdict.decision().is_some());
}

#[tokio::test]
async fn custom_allow_field_and_disabled_result_attribute() {
    let transport = FakeTransport::new();
    transport.respond_json(StatusCode::OK, &json!({"result": {"permit": true}}));
    let handler = RecordingHandler::default();
    let config = config().with_allow_field("permit").with_result_attribute("");

    gate(&transport, config)
        .process(request_as("alice"), &handler)
        .await
        .unwrap();

    let forwarded = handler.take_request();
    let attributes = forwarded.extensions().get::<RequestAttributes>().unwrap();
    assert!(attributes.get("openpolicyagent").is_none());
    assert!(forwarded.extensions().get::<DecisionResult>().is_some());
}

#[tokio::test]
async fn missing_policy_without_callback_is_fatal() {
    let transport = FakeTransport::new();
    transport.respond_json(StatusCode::OK, &json!({}));
    let handler = RecordingHandler::default();

    let err = gate(&transport, config())
        .process(request_as("alice"), &handler)
        .await
        .expect_err("policy missing");

    assert!(matches!(err, GateError::Configuration { .. }));
    assert!(err.to_string().contains("auth/api"));
    assert_eq!(err.policy_not_found().map(|missing| missing.target()), Some("auth/api"));
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn null_result_is_treated_as_missing_policy() {
    let transport = FakeTransport::new();
    transport.respond_json(StatusCode::OK, &json!({"decision_id": "d-9", "result": null}));
    let handler = RecordingHandler::default();
    let consulted = Arc::new(AtomicUsize::new(0));
    let consulted_by_callback = Arc::clone(&consulted);

    let config = config().with_policy_missing_callback(move |_| {
        consulted_by_callback.fetch_add(1, Ordering::SeqCst);
        true
    });

    let response = gate(&transport, config)
        .process(request_as("alice"), &handler)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(consulted.load(Ordering::SeqCst), 1);
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn missing_policy_override_sees_collected_input() {
    let transport = FakeTransport::new();
    transport.respond_json(StatusCode::OK, &json!({}));
    let handler = RecordingHandler::default();
    let seen = Arc::new(Mutex::new(None));
    let seen_by_callback = Arc::clone(&seen);

    let config = config()
        .with_inputs(Inputs::new().with_collector(Arc::new(tenant)))
        .with_policy_missing_callback(move |input| {
            *seen_by_callback.lock().unwrap() = Some(input.clone());
            input["params"]["tenant"] == json!("acme")
        });

    let response = gate(&transport, config)
        .process(request_as("alice"), &handler)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(handler.calls(), 1);
    let input = seen.lock().unwrap().take().unwrap();
    assert_eq!(input["user"], json!("alice"));
    assert_eq!(input["params"], json!({"tenant": "acme"}));
    assert!(handler
        .take_request()
        .extensions()
        .get::<DecisionResult>()
        .is_none());
}

#[tokio::test]
async fn missing_policy_rejected_by_callback_is_denied() {
    let transport = FakeTransport::new();
    transport.respond(StatusCode::NO_CONTENT, "");
    let handler = RecordingHandler::default();

    let response = gate(&transport, config().with_policy_missing_callback(|_| false))
        .process(request_as("alice"), &handler)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn request_keys_win_over_extra_input() {
    let transport = FakeTransport::new();
    let config = config().with_input_callback(|_| {
        let mut extra = Map::new();
        extra.insert("user".to_owned(), json!("spoofed"));
        extra.insert("region".to_owned(), json!("eu"));
        extra
    });

    let input = gate(&transport, config).build_input(&request_as("alice"));
    assert_eq!(input["user"], json!("alice"));
    assert_eq!(input["region"], json!("eu"));
}

#[tokio::test]
async fn anonymous_request_uses_default_identity() {
    let transport = FakeTransport::new();
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .body(Bytes::new())
        .unwrap();

    let input = gate(&transport, config()).build_input(&request);
    assert_eq!(input["user"], json!(""));
    assert_eq!(input["token"], json!({"sub": ""}));
    assert_eq!(input["path"], json!([]));
}

#[tokio::test]
async fn server_error_propagates() {
    let transport = FakeTransport::new();
    transport.respond_json(
        StatusCode::INTERNAL_SERVER_ERROR,
        &json!({"code": "internal_error", "message": "boom"}),
    );
    let handler = RecordingHandler::default();

    let err = gate(&transport, config())
        .process(request_as("alice"), &handler)
        .await
        .expect_err("server error");

    match err {
        GateError::Client(client) => {
            assert_eq!(client.as_server_error().unwrap().opa_code(), "internal_error");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unavailable_agent_propagates() {
    let transport = FakeTransport::new();
    transport.fail(TransportError::connect("connection refused"));

    let err = gate(&transport, config())
        .evaluate(&Map::new())
        .await
        .expect_err("agent unavailable");

    assert!(matches!(
        err,
        GateError::Client(OpaError::AgentUnavailable { .. })
    ));
}

#[test]
fn verdict_helpers() {
    assert!(GateVerdict::Overridden.is_allowed());
    assert!(GateVerdict::Denied { decision: None }.is_denied());
    assert!(GateVerdict::Overridden.decision().is_none());
}
