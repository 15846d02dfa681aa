//! Action configuration.
//!
//! Every flag falls back to the matching GitHub Actions input, which the
//! runner passes to the step as an `INPUT_<NAME>` environment variable.

use broker_core::{Error, Result, SecretValue, ServiceConfiguration, ServiceKind};
use broker_provision::ProvisionRequest;
use clap::{Parser, ValueEnum};

/// Raw command-line and environment inputs.
#[derive(Debug, Parser)]
#[command(name = "token-broker")]
#[command(author, version, about = "Exchange a CI identity token for a service access token", long_about = None)]
pub struct Cli {
    /// Service to request an access token for (oxide, github)
    #[arg(long, env = "INPUT_SERVICE")]
    pub service: Option<String>,

    /// Base URL of the token broker
    #[arg(long = "token-server", env = "INPUT_TOKEN-SERVER")]
    pub token_server: Option<String>,

    /// Oxide silo to request a token for
    #[arg(long, env = "INPUT_SILO")]
    pub silo: Option<String>,

    /// Lifetime of the Oxide token, in seconds
    #[arg(long, env = "INPUT_DURATION")]
    pub duration: Option<String>,

    /// Comma-separated repositories the GitHub token is scoped to
    #[arg(long, env = "INPUT_REPOSITORIES")]
    pub repositories: Option<String>,

    /// Comma-separated permissions requested for the GitHub token
    #[arg(long, env = "INPUT_PERMISSIONS")]
    pub permissions: Option<String>,

    /// Configure git to authenticate with the issued token
    #[arg(long = "configure-git", env = "INPUT_CONFIGURE-GIT")]
    pub configure_git: Option<String>,

    /// Export the issued token as environment variables
    #[arg(long = "configure-env", env = "INPUT_CONFIGURE-ENV")]
    pub configure_env: Option<String>,

    /// Pre-issued identity token, used instead of requesting one
    #[arg(long = "identity-token", env = "BROKER_IDENTITY_TOKEN", hide_env_values = true)]
    pub identity_token: Option<String>,

    /// Log output format
    #[arg(long = "log-format", env = "BROKER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Validated configuration of one run.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    pub service: ServiceKind,
    pub token_server: String,
    pub inputs: ServiceConfiguration,
    pub provision: ProvisionRequest,
    pub identity_token: Option<SecretValue>,
}

impl ActionConfig {
    /// Validate the raw inputs.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let service = cli.service.as_deref().unwrap_or_default().parse::<ServiceKind>()?;

        let token_server = cli
            .token_server
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::configuration("input token-server is required"))?;

        let inputs: ServiceConfiguration = [
            ("silo", cli.silo),
            ("duration", cli.duration),
            ("repositories", cli.repositories),
            ("permissions", cli.permissions),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect();

        let provision = ProvisionRequest {
            configure_git: parse_bool("configure-git", cli.configure_git.as_deref())?,
            configure_env: parse_bool("configure-env", cli.configure_env.as_deref())?,
        };

        let identity_token = cli
            .identity_token
            .filter(|t| !t.trim().is_empty())
            .map(|t| SecretValue::new(t.trim()));

        Ok(Self {
            service,
            token_server,
            inputs,
            provision,
            identity_token,
        })
    }
}

/// Parse a boolean input the way workflow YAML spells booleans.
fn parse_bool(name: &str, value: Option<&str>) -> Result<bool> {
    match value.map(str::trim).unwrap_or_default() {
        "" => Ok(false),
        "true" | "True" | "TRUE" => Ok(true),
        "false" | "False" | "FALSE" => Ok(false),
        other => Err(Error::configuration(format!(
            "input {} must be one of true, True, TRUE, false, False, FALSE; got \"{}\"",
            name, other
        ))),
    }
}
