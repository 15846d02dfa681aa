//! In-memory implementations of the host ports, for tests.

use async_trait::async_trait;
use broker_core::ports::{CommandOutput, CommandRunner, JobRuntime};
use broker_core::{Result, SecretMasker};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Something the job runtime was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Mask(String),
    Export(String),
    Output(String),
    Fail(String),
}

#[derive(Debug, Default)]
struct RuntimeState {
    events: Vec<RuntimeEvent>,
    env: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

/// Job runtime that records everything in memory.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    masker: SecretMasker,
    state: Mutex<RuntimeState>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register masked secrets with `masker` as well.
    pub fn with_masker(masker: SecretMasker) -> Self {
        Self {
            masker,
            state: Mutex::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.state().events.clone()
    }

    pub fn env(&self) -> BTreeMap<String, String> {
        self.state().env.clone()
    }

    pub fn outputs(&self) -> BTreeMap<String, String> {
        self.state().outputs.clone()
    }

    pub fn is_masked(&self, secret: &str) -> bool {
        self.state()
            .events
            .iter()
            .any(|e| matches!(e, RuntimeEvent::Mask(s) if s == secret))
    }
}

impl JobRuntime for MemoryRuntime {
    fn mask_secret(&self, secret: &str) {
        self.masker.register(secret);
        self.state().events.push(RuntimeEvent::Mask(secret.to_string()));
    }

    fn export_variable(&self, name: &str, value: &str) -> Result<()> {
        let mut state = self.state();
        state.events.push(RuntimeEvent::Export(name.to_string()));
        state.env.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn set_output(&self, name: &str, value: &str) -> Result<()> {
        let mut state = self.state();
        state.events.push(RuntimeEvent::Output(name.to_string()));
        state.outputs.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn fail(&self, message: &str) {
        let message = self.masker.mask(message);
        self.state().events.push(RuntimeEvent::Fail(message));
    }
}

/// Command runner that records invocations and replays canned exit codes.
///
/// Calls beyond the queued exit codes succeed.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Vec<String>>>,
    exit_codes: Mutex<VecDeque<(i32, String)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the exit code and stderr of the next call.
    pub fn then_exit(self, code: i32, stderr: &str) -> Self {
        self.exit_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((code, stderr.to_string()));
        self
    }

    /// Every call so far, as `[program, args...]`.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);

        let (code, stderr) = self
            .exit_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or((0, String::new()));

        Ok(CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr,
        })
    }
}
