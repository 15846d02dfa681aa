//! Identity token issuance.

use async_trait::async_trait;
use broker_core::SecretValue;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

const REQUEST_URL_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";
const REQUEST_TOKEN_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0} is not set, make sure the job has the `id-token: write` permission")]
    MissingEnvironment(&'static str),
    #[error("invalid token request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("token request failed with status code {status}: {body}")]
    Status { status: u16, body: String },
    #[error("token response did not contain a token")]
    MissingToken,
}

impl From<IdentityError> for broker_core::Error {
    fn from(err: IdentityError) -> Self {
        broker_core::Error::Identity(err.to_string())
    }
}

/// Source of the job's identity token.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Obtain an identity token whose audience is `audience`.
    async fn fetch(&self, audience: &str) -> Result<SecretValue, IdentityError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// GitHub Actions OIDC token issuance.
///
/// The runner only exposes the token request endpoint to jobs granted
/// `id-token: write`; without it, [`fetch`](IdentityProvider::fetch) fails.
pub struct GitHubActionsIdentity {
    request_url: Option<String>,
    request_token: Option<SecretValue>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    value: Option<String>,
}

impl GitHubActionsIdentity {
    pub fn new(request_url: impl Into<String>, request_token: SecretValue) -> Self {
        Self {
            request_url: Some(request_url.into()),
            request_token: Some(request_token),
            client: reqwest::Client::new(),
        }
    }

    /// Read the token request endpoint the runner exposes to the job.
    pub fn from_env() -> Self {
        Self::from_vars(read_env(REQUEST_URL_VAR), read_env(REQUEST_TOKEN_VAR))
    }

    /// Build from the raw runner variables; empty values count as unset.
    pub fn from_vars(request_url: Option<String>, request_token: Option<String>) -> Self {
        Self {
            request_url: request_url.filter(|value| !value.is_empty()),
            request_token: request_token
                .filter(|value| !value.is_empty())
                .map(SecretValue::new),
            client: reqwest::Client::new(),
        }
    }

    fn token_url(&self, audience: &str) -> Result<Url, IdentityError> {
        let request_url = self
            .request_url
            .as_deref()
            .ok_or(IdentityError::MissingEnvironment(REQUEST_URL_VAR))?;
        let mut url = Url::parse(request_url)?;
        url.query_pairs_mut().append_pair("audience", audience);
        Ok(url)
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[async_trait]
impl IdentityProvider for GitHubActionsIdentity {
    async fn fetch(&self, audience: &str) -> Result<SecretValue, IdentityError> {
        let url = self.token_url(audience)?;
        let request_token = self
            .request_token
            .as_ref()
            .ok_or(IdentityError::MissingEnvironment(REQUEST_TOKEN_VAR))?;
        debug!(audience = %audience, "Requesting identity token");

        let response = self
            .client
            .get(url)
            .bearer_auth(request_token.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        token
            .value
            .filter(|value| !value.is_empty())
            .map(SecretValue::new)
            .ok_or(IdentityError::MissingToken)
    }

    fn name(&self) -> &str {
        "github-actions"
    }
}

/// A pre-issued identity token, for running outside a CI platform.
pub struct StaticIdentity {
    token: SecretValue,
}

impl StaticIdentity {
    pub fn new(token: SecretValue) -> Self {
        Self { token }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn fetch(&self, _audience: &str) -> Result<SecretValue, IdentityError> {
        Ok(self.token.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}
