//! The exchange-and-provisioning pipeline.

use crate::config::ActionConfig;
use broker_auth::{ExchangeClient, IdentityProvider};
use broker_core::ports::{CommandRunner, JobRuntime};
use broker_core::{Credential, OUTPUT_NAME, Result};
use broker_provision::Provisioner;
use std::process::ExitCode;
use tracing::info;

/// Map the outcome of a run to the process exit code.
///
/// An error fails the step through the runtime, which masks it.
pub fn report<T>(runtime: &dyn JobRuntime, result: Result<T>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            runtime.fail(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

/// Drives one run: identity token, exchange, then provisioning.
///
/// Stages run strictly in order and the first error ends the run.
pub struct Pipeline<'a> {
    runtime: &'a dyn JobRuntime,
    identity: &'a dyn IdentityProvider,
    runner: &'a dyn CommandRunner,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        runtime: &'a dyn JobRuntime,
        identity: &'a dyn IdentityProvider,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            runtime,
            identity,
            runner,
        }
    }

    pub async fn run(&self, config: &ActionConfig) -> Result<Credential> {
        // Everything the caller configured is checked before any network call.
        let fields = broker_core::prepare(config.service, &config.inputs)?;
        let client = ExchangeClient::new(&config.token_server)?;

        info!(provider = %self.identity.name(), "Requesting identity token");
        let identity = self.identity.fetch(&config.token_server).await?;
        self.runtime.mask_secret(identity.expose());
        info!("Retrieved identity token");

        let request = fields.with_identity(identity);
        let credential = client.exchange(&request).await?;

        self.runtime.mask_secret(credential.expose());
        self.runtime.set_output(OUTPUT_NAME, credential.expose())?;

        Provisioner::new(self.runtime, self.runner)
            .provision(
                config.service,
                &credential,
                &config.inputs,
                &config.provision.actions(),
            )
            .await?;

        Ok(credential)
    }
}
