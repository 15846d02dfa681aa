//! Credential provisioning.

use crate::git;
use broker_core::ports::{CommandRunner, JobRuntime};
use broker_core::service::EnvSource;
use broker_core::{Credential, Error, Result, ServiceConfiguration, ServiceKind};
use tracing::info;

/// A way of making the credential available to later steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionAction {
    /// Configure git to authenticate with the credential.
    ConfigureGit,
    /// Export the credential as environment variables.
    ExportEnv,
}

/// The provisioning switches the caller turned on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub configure_git: bool,
    pub configure_env: bool,
}

impl ProvisionRequest {
    /// Requested actions, in execution order.
    pub fn actions(&self) -> Vec<ProvisionAction> {
        let mut actions = Vec::new();
        if self.configure_git {
            actions.push(ProvisionAction::ConfigureGit);
        }
        if self.configure_env {
            actions.push(ProvisionAction::ExportEnv);
        }
        actions
    }
}

/// Applies provisioning actions to the job the client runs in.
///
/// The credential must already be registered as a secret with the runtime.
pub struct Provisioner<'a> {
    runtime: &'a dyn JobRuntime,
    runner: &'a dyn CommandRunner,
}

impl<'a> Provisioner<'a> {
    pub fn new(runtime: &'a dyn JobRuntime, runner: &'a dyn CommandRunner) -> Self {
        Self { runtime, runner }
    }

    /// Run each action in order, stopping at the first failure.
    pub async fn provision(
        &self,
        service: ServiceKind,
        credential: &Credential,
        config: &ServiceConfiguration,
        actions: &[ProvisionAction],
    ) -> Result<()> {
        for action in actions {
            match action {
                ProvisionAction::ConfigureGit => {
                    git::configure_credentials(self.runtime, self.runner, service, credential)
                        .await?
                }
                ProvisionAction::ExportEnv => self.export_env(service, credential, config)?,
            }
        }
        Ok(())
    }

    fn export_env(
        &self,
        service: ServiceKind,
        credential: &Credential,
        config: &ServiceConfiguration,
    ) -> Result<()> {
        let bindings = service.env_bindings();
        if bindings.is_empty() {
            return Err(Error::provisioning(format!(
                "configure-env: true is not supported for service {}",
                service
            )));
        }

        // Resolve everything before exporting anything.
        let mut values = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let value = match binding.source {
                EnvSource::Credential => credential.expose(),
                EnvSource::Config(key) => config.get(key).map(str::trim).ok_or_else(|| {
                    Error::provisioning(format!(
                        "input {} is required to configure the environment for service {}",
                        key, service
                    ))
                })?,
            };
            values.push((binding.name, value));
        }

        for (name, value) in values {
            self.runtime.export_variable(name, value)?;
            info!("Configured {} environment variable", name);
        }
        Ok(())
    }
}
