//! Git credential configuration.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use broker_core::ports::{CommandRunner, JobRuntime};
use broker_core::{Credential, Error, Result, ServiceKind};
use tracing::info;

/// `git config --unset-all` exit code when the key does not exist.
const GIT_CONFIG_KEY_MISSING: i32 = 5;

/// Config key holding the extra HTTP header git sends to `host`.
pub fn extraheader_key(host: &str) -> String {
    format!("http.{}.extraheader", host)
}

/// Basic-auth blob git sends for a GitHub access token.
pub fn basic_auth_blob(credential: &Credential) -> String {
    STANDARD.encode(format!("x-access-token:{}", credential.expose()))
}

/// Configure git to authenticate to the service's host with `credential`.
///
/// The header is set in the global scope, then any local-scope header for the
/// same host is removed: a checkout step may have persisted its own token
/// there, and local scope takes precedence over global.
pub async fn configure_credentials(
    runtime: &dyn JobRuntime,
    runner: &dyn CommandRunner,
    service: ServiceKind,
    credential: &Credential,
) -> Result<()> {
    let host = service.git_host().ok_or_else(|| {
        Error::provisioning("`configure-git: true` is only supported for the GitHub service")
    })?;

    let blob = basic_auth_blob(credential);
    runtime.mask_secret(&blob);

    info!(host = %host, "Configuring git to use the access token for authentication");

    let key = extraheader_key(host);
    git_config(
        runner,
        "--global",
        &[key.clone(), format!("authorization: basic {}", blob)],
        &[0],
    )
    .await?;
    git_config(
        runner,
        "--local",
        &["--unset-all".to_string(), key],
        &[0, GIT_CONFIG_KEY_MISSING],
    )
    .await?;

    Ok(())
}

async fn git_config(
    runner: &dyn CommandRunner,
    scope: &str,
    rest: &[String],
    accepted: &[i32],
) -> Result<()> {
    let mut args = vec!["config".to_string(), scope.to_string()];
    args.extend(rest.iter().cloned());

    let output = runner.run("git", &args).await?;
    match output.code {
        Some(code) if accepted.contains(&code) => Ok(()),
        code => Err(Error::provisioning(format!(
            "git config {} failed with exit code {}: {}",
            scope,
            code.map_or_else(|| "none".to_string(), |c| c.to_string()),
            output.stderr.trim()
        ))),
    }
}
