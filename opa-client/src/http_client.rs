//! Default [`Transport`] backed by a hyper client with rustls.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use tokio::time::timeout;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::transport::{
    Transport, TransportError, TransportRequest, TransportResponse, TransportResult,
};

type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Settings for [`HyperTransport`].
#[derive(Clone, Debug)]
pub struct HyperTransportConfig {
    timeout: Duration,
}

impl Default for HyperTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl HyperTransportConfig {
    /// Sets the deadline for a whole exchange, body included.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the configured deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// HTTP/HTTPS transport using hyper and the webpki root store.
pub struct HyperTransport {
    client: HyperClient,
    timeout: Duration,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(HyperTransportConfig::default())
    }
}

impl HyperTransport {
    /// Builds the transport.
    #[must_use]
    pub fn new(config: HyperTransportConfig) -> Self {
        Self {
            client: build_https_client(),
            timeout: config.timeout,
        }
    }

    async fn exchange(&self, request: Request<Body>) -> TransportResult<TransportResponse> {
        let response = self.client.request(request).await.map_err(|err| {
            if err.is_connect() {
                TransportError::connect(err.to_string())
            } else if err.is_canceled() {
                TransportError::Cancelled
            } else {
                TransportError::protocol(err.to_string())
            }
        })?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|err| TransportError::protocol(format!("invalid status: {err}")))?;
        let headers = convert_headers(response.headers());
        let body = to_bytes(response.into_body())
            .await
            .map_err(|err| TransportError::protocol(format!("failed to read body: {err}")))?;

        Ok(TransportResponse::new(status, body).with_headers(headers))
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: TransportRequest) -> TransportResult<TransportResponse> {
        let mut builder = Request::builder()
            .method(request.method().as_str())
            .uri(request.url());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_bytes());
        }
        let outgoing = builder
            .body(Body::from(request.body().clone()))
            .map_err(|err| TransportError::protocol(format!("failed to build request: {err}")))?;

        timeout(self.timeout, self.exchange(outgoing))
            .await
            .map_err(|_| TransportError::TimedOut {
                after: self.timeout,
            })?
    }
}

// hyper 0.14 is built on `http` 0.2; the public types use `http` 1.
fn convert_headers(source: &hyper::header::HeaderMap) -> HeaderMap {
    source
        .iter()
        .filter_map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_str().as_bytes()).ok()?;
            let value = HeaderValue::from_bytes(value.as_bytes()).ok()?;
            Some((name, value))
        })
        .collect()
}

fn build_https_client() -> HyperClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Client::builder().build::<_, Body>(connector)
}
