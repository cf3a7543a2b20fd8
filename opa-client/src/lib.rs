//! Client for the Open Policy Agent REST decision API.
//!
//! [`DecisionClient`] builds agent URLs ([`url`]), sends requests through an
//! injected [`Transport`], and turns the agent's JSON envelopes into a
//! [`DecisionResult`] or one of the errors in [`error`].

#![warn(missing_docs, clippy::pedantic)]

pub mod client;
pub mod config;
pub mod decision;
pub mod error;
pub mod provenance;
pub mod transport;
pub mod url;

mod http_client;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::DecisionClient;
pub use config::ClientConfig;
pub use decision::{DecisionEnvelope, DecisionResult};
pub use error::{ErrorDetail, ErrorLocation, OpaError, OpaResult, PolicyNotFound, ServerError};
pub use http_client::{HyperTransport, HyperTransportConfig};
pub use provenance::{Bundle, Provenance};
pub use transport::{
    Transport, TransportError, TransportRequest, TransportResponse, TransportResult,
};
pub use url::{AgentUrl, QueryFlags};
