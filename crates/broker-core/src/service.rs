//! Downstream services supported by the broker.

use crate::request::{FieldRule, Transform};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A downstream service the broker can issue credentials for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Oxide,
    Github,
}

/// Where the value of an exported environment variable comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvSource {
    /// The issued credential.
    Credential,
    /// A caller configuration value, by key.
    Config(&'static str),
}

/// One environment variable written by the environment export action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvBinding {
    pub name: &'static str,
    pub source: EnvSource,
}

const GITHUB_ENV: &[EnvBinding] = &[EnvBinding {
    name: "GITHUB_TOKEN",
    source: EnvSource::Credential,
}];

const OXIDE_ENV: &[EnvBinding] = &[
    EnvBinding {
        name: "OXIDE_HOST",
        source: EnvSource::Config("silo"),
    },
    EnvBinding {
        name: "OXIDE_TOKEN",
        source: EnvSource::Credential,
    },
];

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Oxide, ServiceKind::Github];

    /// Wire name of the service.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Oxide => "oxide",
            ServiceKind::Github => "github",
        }
    }

    /// Request fields owned by this service.
    pub fn field_rules(self) -> impl Iterator<Item = &'static FieldRule> {
        FIELD_RULES.iter().filter(move |rule| rule.service == self)
    }

    /// Environment variables exported for this service.
    pub fn env_bindings(&self) -> &'static [EnvBinding] {
        match self {
            ServiceKind::Oxide => OXIDE_ENV,
            ServiceKind::Github => GITHUB_ENV,
        }
    }

    /// Remote host git should authenticate against, if git credentials can
    /// be configured for this service at all.
    pub fn git_host(&self) -> Option<&'static str> {
        match self {
            ServiceKind::Github => Some("https://github.com/"),
            ServiceKind::Oxide => None,
        }
    }
}

/// Every service-specific request field, across all services.
pub const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        service: ServiceKind::Oxide,
        key: "silo",
        required: true,
        transform: Transform::Trim,
    },
    FieldRule {
        service: ServiceKind::Oxide,
        key: "duration",
        required: true,
        transform: Transform::Integer,
    },
    FieldRule {
        service: ServiceKind::Github,
        key: "repositories",
        required: false,
        transform: Transform::CommaSeparated,
    },
    FieldRule {
        service: ServiceKind::Github,
        key: "permissions",
        required: false,
        transform: Transform::CommaSeparated,
    },
];

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        ServiceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::configuration(format!("unsupported service: {}", s)))
    }
}
