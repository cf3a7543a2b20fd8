//! Scripted transport for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use serde_json::Value;

use crate::transport::{
    Transport, TransportError, TransportRequest, TransportResponse, TransportResult,
};

/// Transport replaying queued replies and recording every request it sees.
///
/// Each test builds and owns its own instance.
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<VecDeque<TransportResult<TransportResponse>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl FakeTransport {
    /// Creates a transport with no scripted replies.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a reply with a raw body.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    pub fn respond(&self, status: StatusCode, body: impl Into<Bytes>) -> &Self {
        self.push(Ok(TransportResponse::new(status, body)));
        self
    }

    /// Queues a reply with a JSON body.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    pub fn respond_json(&self, status: StatusCode, body: &Value) -> &Self {
        self.respond(status, body.to_string())
    }

    /// Queues a connection-level failure.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    pub fn fail(&self, error: TransportError) -> &Self {
        self.push(Err(error));
        self
    }

    /// Returns the requests sent so far, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().expect("fake transport poisoned").clone()
    }

    /// Returns the most recent request.
    ///
    /// # Panics
    ///
    /// Panics if no request was sent or the internal mutex has been poisoned.
    #[must_use]
    pub fn last_request(&self) -> TransportRequest {
        self.requests()
            .pop()
            .expect("no request has been sent through the fake transport")
    }

    fn push(&self, reply: TransportResult<TransportResponse>) {
        self.replies
            .lock()
            .expect("fake transport poisoned")
            .push_back(reply);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: TransportRequest) -> TransportResult<TransportResponse> {
        self.requests
            .lock()
            .expect("fake transport poisoned")
            .push(request);

        self.replies
            .lock()
            .expect("fake transport poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::connect("no scripted reply left")))
    }
}
