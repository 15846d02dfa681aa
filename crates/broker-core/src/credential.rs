//! Exchange outcomes.

use crate::SecretValue;
use std::fmt;

/// Name of the job output the credential is published under.
pub const OUTPUT_NAME: &str = "access-token";

/// Access credential issued by the broker.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Response field the credential was read from.
    pub field: &'static str,
    pub secret: SecretValue,
}

impl Credential {
    pub fn new(field: &'static str, secret: SecretValue) -> Self {
        Self { field, secret }
    }

    pub fn expose(&self) -> &str {
        self.secret.expose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The broker answered with a non-success status.
    Rejected,
    /// The broker answered with success, but the body was unusable.
    Malformed,
}

/// A failed exchange, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeFailure {
    pub status: u16,
    pub message: Option<String>,
    pub kind: FailureKind,
}

impl ExchangeFailure {
    pub fn rejected(status: u16, message: Option<String>) -> Self {
        Self {
            status,
            message,
            kind: FailureKind::Rejected,
        }
    }

    pub fn malformed(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            kind: FailureKind::Malformed,
        }
    }
}

impl fmt::Display for ExchangeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Rejected => {
                write!(f, "fetching the token failed with status code {}", self.status)?;
                if let Some(message) = &self.message {
                    write!(f, ": {}", message)?;
                }
                Ok(())
            }
            FailureKind::Malformed => write!(
                f,
                "the token server returned a malformed response (status code {}): {}",
                self.status,
                self.message.as_deref().unwrap_or("empty body")
            ),
        }
    }
}

impl std::error::Error for ExchangeFailure {}
