//! GitHub Actions job runtime.
//!
//! Talks to the runner through workflow commands on stdout and through the
//! `GITHUB_ENV` / `GITHUB_OUTPUT` files.

use broker_core::ports::JobRuntime;
use broker_core::{Error, Result, SecretMasker};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::warn;
use uuid::Uuid;

/// Job runtime for GitHub Actions.
pub struct ActionsRuntime {
    masker: SecretMasker,
    env_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    stdout: Mutex<Box<dyn Write + Send>>,
}

impl ActionsRuntime {
    pub fn new(
        masker: SecretMasker,
        env_file: Option<PathBuf>,
        output_file: Option<PathBuf>,
        stdout: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            masker,
            env_file,
            output_file,
            stdout: Mutex::new(stdout),
        }
    }

    /// Runtime for the current job, using the files the runner advertises.
    pub fn from_env(masker: SecretMasker) -> Self {
        let file = |name: &str| {
            std::env::var_os(name)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        };
        Self::new(
            masker,
            file("GITHUB_ENV"),
            file("GITHUB_OUTPUT"),
            Box::new(io::stdout()),
        )
    }

    fn issue(&self, command: &str, properties: &[(&str, &str)], message: &str) -> io::Result<()> {
        let mut line = format!("::{}", command);
        if !properties.is_empty() {
            let props = properties
                .iter()
                .map(|(k, v)| format!("{}={}", k, escape_property(v)))
                .collect::<Vec<_>>()
                .join(",");
            line.push(' ');
            line.push_str(&props);
        }
        line.push_str("::");
        line.push_str(&escape_data(message));

        let mut stdout = self.stdout.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(stdout, "{}", line)?;
        stdout.flush()
    }

    fn issue_or_warn(&self, command: &str, properties: &[(&str, &str)], message: &str) {
        if let Err(e) = self.issue(command, properties, message) {
            warn!(command = %command, error = %e, "Failed to issue workflow command");
        }
    }
}

impl JobRuntime for ActionsRuntime {
    fn mask_secret(&self, secret: &str) {
        if secret.is_empty() {
            return;
        }
        self.masker.register(secret);
        self.issue_or_warn("add-mask", &[], secret);
    }

    fn export_variable(&self, name: &str, value: &str) -> Result<()> {
        match &self.env_file {
            Some(path) => append_file_command(path, name, value),
            None => self
                .issue("set-env", &[("name", name)], value)
                .map_err(Error::from),
        }
    }

    fn set_output(&self, name: &str, value: &str) -> Result<()> {
        match &self.output_file {
            Some(path) => append_file_command(path, name, value),
            None => self
                .issue("set-output", &[("name", name)], value)
                .map_err(Error::from),
        }
    }

    fn fail(&self, message: &str) {
        let message = self.masker.mask(message);
        self.issue_or_warn("error", &[], &message);
    }
}

/// Append `name=value` to a runner file using a random heredoc delimiter.
fn append_file_command(path: &Path, name: &str, value: &str) -> Result<()> {
    let delimiter = format!("ghadelimiter_{}", Uuid::new_v4());
    if name.contains(&delimiter) || value.contains(&delimiter) {
        return Err(Error::provisioning(format!(
            "unexpected input: name or value contains the delimiter {}",
            delimiter
        )));
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    write!(file, "{name}<<{delimiter}\n{value}\n{delimiter}\n")?;
    Ok(())
}

fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}
