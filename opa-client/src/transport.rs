//! Transport capability the decision client sends its requests through.
//!
//! The client never talks to the network directly: it hands a fully built
//! [`TransportRequest`] to a [`Transport`] and classifies whatever comes back.
//! Timeouts, TLS, pooling and cancellation are the transport's business.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

/// Result alias used by transports.
pub type TransportResult<T> = Result<T, TransportError>;

/// Connection-level failure: no HTTP status was received.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The agent could not be reached (DNS, connection refused, TLS handshake).
    #[error("connection failed: {reason}")]
    Connect {
        /// Additional context about the failure.
        reason: String,
    },

    /// The exchange did not finish within the transport's deadline.
    #[error("request timed out after {after:?}")]
    TimedOut {
        /// Deadline that elapsed.
        after: Duration,
    },

    /// The exchange was cancelled before a response arrived.
    #[error("request cancelled")]
    Cancelled,

    /// Protocol-level failure while sending or reading the exchange.
    #[error("transport protocol error: {reason}")]
    Protocol {
        /// Additional context about the failure.
        reason: String,
    },
}

impl TransportError {
    /// Convenience constructor for connection failures.
    #[must_use]
    pub fn connect(reason: impl Into<String>) -> Self {
        Self::Connect {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for protocol failures.
    #[must_use]
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }
}

/// Fully built HTTP request handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Bytes,
}

impl TransportRequest {
    /// Creates a request with no headers and an empty body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Replaces the request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replaces the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the absolute request URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the raw request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// HTTP response returned by a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TransportResponse {
    /// Creates a response with the given status and body and no headers.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Replaces the response headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the raw response body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the response, returning its body.
    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

/// Sends one HTTP exchange to the agent.
///
/// Implementations must report every failure that happens before a status
/// line is received as a [`TransportError`]; any received status, including
/// 4xx and 5xx, is a successful [`TransportResponse`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the exchange.
    async fn send(&self, request: TransportRequest) -> TransportResult<TransportResponse>;
}
