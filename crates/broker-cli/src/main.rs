//! Token broker client entrypoint.

use broker_auth::{GitHubActionsIdentity, IdentityProvider, StaticIdentity};
use broker_core::SecretMasker;
use broker_core::ports::{CommandRunner, JobRuntime};
use broker_provision::{ActionsRuntime, TokioCommandRunner};
use clap::Parser;
use std::process::ExitCode;

mod config;
mod logging;
mod pipeline;

#[cfg(test)]
mod pipeline_tests;

use config::{ActionConfig, Cli};
use pipeline::Pipeline;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let masker = SecretMasker::new();
    logging::init(masker.clone(), cli.log_format);
    let runtime = ActionsRuntime::from_env(masker);

    run(cli, &runtime, &TokioCommandRunner::new()).await
}

/// Run once against the given host, reporting any error through `runtime`.
async fn run(cli: Cli, runtime: &dyn JobRuntime, runner: &dyn CommandRunner) -> ExitCode {
    let config = match ActionConfig::from_cli(cli) {
        Ok(config) => config,
        Err(e) => return pipeline::report(runtime, Err::<(), _>(e)),
    };

    let identity = identity_provider(&config, runtime);
    let result = Pipeline::new(runtime, identity.as_ref(), runner)
        .run(&config)
        .await;
    pipeline::report(runtime, result)
}

// Runner variables are only read here; a job without `id-token: write`
// fails when the token is requested, after the inputs are validated.
fn identity_provider(config: &ActionConfig, runtime: &dyn JobRuntime) -> Box<dyn IdentityProvider> {
    match &config.identity_token {
        Some(token) => {
            runtime.mask_secret(token.expose());
            Box::new(StaticIdentity::new(token.clone()))
        }
        None => Box::new(GitHubActionsIdentity::from_env()),
    }
}
