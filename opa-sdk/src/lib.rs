//! Open Policy Agent client SDK facade.
//!
//! Depend on this crate via `cargo add opa-sdk`. It bundles the decision client
//! and, behind the `authz` feature, the request authorization gate.

#![warn(missing_docs, clippy::pedantic)]

/// Decision API client.
pub use opa_client as client;

pub use opa_client::{
    ClientConfig, DecisionClient, DecisionResult, OpaError, OpaResult, PolicyNotFound,
    QueryFlags, ServerError,
};

/// Request authorization gate (enabled by `authz` feature).
#[cfg(feature = "authz")]
pub use opa_authz as authz;
