//! Authorization gate backed by Open Policy Agent decisions.
//!
//! [`AuthorizationGate`] builds a decision input from each request, asks the
//! agent through an [`opa_client::DecisionClient`] and either forwards the
//! request to the next pipeline stage or answers `403 Forbidden`.

#![warn(missing_docs, clippy::pedantic)]

pub mod config;
pub mod error;
pub mod gate;
pub mod input;

pub use config::{AuthorizationConfig, InputCallback, PolicyMissingCallback};
pub use error::{CollectError, GateError, GateResult};
pub use gate::{AuthorizationGate, GateVerdict, NextHandler};
pub use input::{InputCollector, Inputs, RequestAttributes, request_input};
