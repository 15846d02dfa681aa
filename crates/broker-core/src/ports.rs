//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the pipeline and the host it
//! runs in: the CI job runtime and process execution.

use crate::Result;
use async_trait::async_trait;

/// The CI job the client runs inside.
pub trait JobRuntime: Send + Sync {
    /// Register a value that must be redacted from all job logs.
    fn mask_secret(&self, secret: &str);

    /// Export an environment variable to later steps of the job.
    fn export_variable(&self, name: &str, value: &str) -> Result<()>;

    /// Set a job output.
    fn set_output(&self, name: &str, value: &str) -> Result<()>;

    /// Report the terminal failure of this step.
    fn fail(&self, message: &str);
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}
