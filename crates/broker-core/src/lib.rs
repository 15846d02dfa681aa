//! Token Broker Core
//!
//! Core domain types, traits, and error handling for the token broker
//! client. This crate has minimal dependencies and defines the shared
//! vocabulary used by the network, provisioning, and CLI crates.

pub mod credential;
pub mod error;
pub mod ports;
pub mod request;
pub mod secrets;
pub mod service;

pub use credential::{Credential, ExchangeFailure, FailureKind, OUTPUT_NAME};
pub use error::{Error, Result};
pub use request::{ExchangeRequest, FieldValue, RequestFields, ServiceConfiguration, build, prepare};
pub use secrets::{SecretMasker, SecretValue};
pub use service::ServiceKind;
