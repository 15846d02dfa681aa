//! Broker token exchange.

use broker_core::{Credential, ExchangeFailure, ExchangeRequest, SecretValue};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

/// Response field carrying the issued credential.
const ACCESS_TOKEN_FIELD: &str = "access_token";

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("invalid token server URL {url:?}: {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error(transparent)]
    Failure(#[from] ExchangeFailure),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<ExchangeError> for broker_core::Error {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::InvalidEndpoint { .. } => broker_core::Error::Configuration(err.to_string()),
            ExchangeError::Failure(failure) => broker_core::Error::Exchange(failure),
            ExchangeError::Http(e) => broker_core::Error::Network(e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SuccessBody {
    access_token: Option<String>,
}

/// Extract a human-readable message from an error response body.
///
/// The broker answers with `{"message": "..."}`, but a misbehaving proxy in
/// front of it may not answer with JSON at all. Bodies that are not JSON are
/// returned verbatim; empty bodies yield `None`.
pub fn extract_error_message(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(mut fields)) => match fields.remove("message") {
            None | Some(Value::Null) => None,
            Some(Value::String(message)) => Some(message),
            Some(other) => Some(other.to_string()),
        },
        Ok(_) => None,
        Err(_) if body.trim().is_empty() => None,
        Err(_) => Some(body.to_string()),
    }
}

fn parse_credential(status: u16, body: &str) -> Result<Credential, ExchangeFailure> {
    let parsed: SuccessBody = serde_json::from_str(body)
        .map_err(|e| ExchangeFailure::malformed(status, format!("invalid JSON: {}", e)))?;

    parsed
        .access_token
        .filter(|token| !token.is_empty())
        .map(|token| Credential::new(ACCESS_TOKEN_FIELD, SecretValue::new(token)))
        .ok_or_else(|| ExchangeFailure::malformed(status, format!("missing {}", ACCESS_TOKEN_FIELD)))
}

/// Client for a broker's `/exchange` endpoint.
///
/// Each exchange is a single request: no retries, and no timeout beyond the
/// transport's defaults.
pub struct ExchangeClient {
    url: Url,
    client: reqwest::Client,
}

impl ExchangeClient {
    /// Create a client for the broker rooted at `endpoint`.
    pub fn new(endpoint: &str) -> Result<Self, ExchangeError> {
        let raw = format!("{}/exchange", endpoint.trim().trim_end_matches('/'));
        let url = Url::parse(&raw).map_err(|source| ExchangeError::InvalidEndpoint {
            url: endpoint.to_string(),
            source,
        })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("token-broker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { url, client })
    }

    /// URL exchange requests are posted to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Trade the identity carried by `request` for an access credential.
    pub async fn exchange(&self, request: &ExchangeRequest) -> Result<Credential, ExchangeError> {
        info!(service = %request.service(), url = %self.url, "Exchanging identity token");

        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), "Token server responded");

        if !status.is_success() {
            return Err(
                ExchangeFailure::rejected(status.as_u16(), extract_error_message(&body)).into(),
            );
        }

        let credential = parse_credential(status.as_u16(), &body)?;
        info!(service = %request.service(), "Received access token");
        Ok(credential)
    }
}
