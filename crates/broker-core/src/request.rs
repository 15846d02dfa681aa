//! Exchange request construction.
//!
//! Service-specific fields are described by the [`FIELD_RULES`] table and
//! validated by one routine, [`build`]. Supporting a new service means adding
//! rows to the table, not new control flow.
//!
//! [`FIELD_RULES`]: crate::service::FIELD_RULES

use crate::service::{FIELD_RULES, ServiceKind};
use crate::{Error, Result, SecretValue};
use serde::Serialize;
use std::collections::BTreeMap;

/// How a raw configuration value is turned into a request field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Strip surrounding whitespace.
    Trim,
    /// Parse as an unsigned integer.
    Integer,
    /// Split on commas into a list of trimmed, non-empty entries.
    CommaSeparated,
}

/// A request field owned by one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub service: ServiceKind,
    pub key: &'static str,
    pub required: bool,
    pub transform: Transform,
}

/// A transformed request field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(u64),
    List(Vec<String>),
}

impl Transform {
    fn apply(&self, key: &str, value: &str) -> Result<FieldValue> {
        match self {
            Transform::Trim => Ok(FieldValue::Text(value.trim().to_string())),
            Transform::Integer => value.trim().parse::<u64>().map(FieldValue::Integer).map_err(
                |_| Error::configuration(format!("input {} must be an integer, got \"{}\"", key, value)),
            ),
            Transform::CommaSeparated => Ok(FieldValue::List(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
        }
    }
}

/// Caller-supplied configuration, keyed by input name.
///
/// Empty and whitespace-only values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfiguration {
    values: BTreeMap<String, String>,
}

impl ServiceConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Blank values are dropped.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.values.insert(key.into(), value);
        }
    }

    /// Get a configuration value, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ServiceConfiguration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = Self::new();
        for (key, value) in iter {
            config.insert(key, value);
        }
        config
    }
}

/// Payload sent to the broker's `/exchange` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRequest {
    caller_identity: SecretValue,
    service: ServiceKind,
    #[serde(flatten)]
    fields: BTreeMap<&'static str, FieldValue>,
}

impl ExchangeRequest {
    pub fn service(&self) -> ServiceKind {
        self.service
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }
}

/// Validated service-specific fields, waiting for the caller's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFields {
    service: ServiceKind,
    fields: BTreeMap<&'static str, FieldValue>,
}

impl RequestFields {
    pub fn service(&self) -> ServiceKind {
        self.service
    }

    /// Complete the request with the caller's identity token.
    pub fn with_identity(self, identity: SecretValue) -> ExchangeRequest {
        ExchangeRequest {
            caller_identity: identity,
            service: self.service,
            fields: self.fields,
        }
    }
}

/// Validate and transform the configuration for `service`.
///
/// Fails if the configuration carries a field owned by another service, or
/// lacks a field the selected service requires.
pub fn prepare(service: ServiceKind, config: &ServiceConfiguration) -> Result<RequestFields> {
    // Foreign fields are reported first, whatever the table order.
    if let Some(rule) = FIELD_RULES
        .iter()
        .find(|rule| rule.service != service && config.contains(rule.key))
    {
        return Err(Error::configuration(format!(
            "input {} is only supported when the service is {}",
            rule.key, rule.service
        )));
    }

    let mut fields = BTreeMap::new();
    for rule in service.field_rules() {
        match config.get(rule.key) {
            Some(value) => {
                fields.insert(rule.key, rule.transform.apply(rule.key, value)?);
            }
            None if rule.required => {
                return Err(Error::configuration(format!(
                    "input {} is required when the service is {}",
                    rule.key, service
                )));
            }
            None => {}
        }
    }

    Ok(RequestFields { service, fields })
}

/// Build a validated exchange request for `service`.
pub fn build(
    service: ServiceKind,
    identity: SecretValue,
    config: &ServiceConfiguration,
) -> Result<ExchangeRequest> {
    Ok(prepare(service, config)?.with_identity(identity))
}
