//! Error types for the token broker client.

use crate::credential::ExchangeFailure;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Caller input errors, detected before any network call
    #[error("{0}")]
    Configuration(String),

    // Identity token issuance
    #[error("requesting the identity token failed: {0}")]
    Identity(String),

    // Broker errors
    #[error("{0}")]
    Exchange(ExchangeFailure),

    #[error("contacting the token server failed: {0}")]
    Network(String),

    // Provisioning errors
    #[error("{0}")]
    Provisioning(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn provisioning(message: impl Into<String>) -> Self {
        Self::Provisioning(message.into())
    }
}

impl From<ExchangeFailure> for Error {
    fn from(failure: ExchangeFailure) -> Self {
        Error::Exchange(failure)
    }
}
