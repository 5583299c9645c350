pub mod tokio_process;

pub use tokio_process::TokioProcessExecutor;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::{Duration, SystemTime};

use crate::models::{CoreError, CoreErrorKind};

pub type ExecutionResult<T> = Result<T, CoreError>;

pub type ProcessWaitFuture = Pin<Box<dyn Future<Output = ExecutionResult<ProcessOutput>> + Send>>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// `/bin/sh -c <command>`.
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new("/bin/sh").arg("-c").arg(command)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    pub fn working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    /// Rejects specs the OS would refuse or silently truncate.
    pub fn validate(&self) -> ExecutionResult<()> {
        if self.program.as_os_str().is_empty() {
            return Err(invalid_input("command program path must not be empty"));
        }
        if let Some(arg) = self.args.iter().find(|arg| arg.is_empty() || arg.contains('\0')) {
            return Err(invalid_input(&format!(
                "command argument {arg:?} is empty or contains a NUL byte"
            )));
        }
        if let Some((key, _)) = self
            .env
            .iter()
            .find(|(key, value)| key.is_empty() || key.contains(['\0', '=']) || value.contains('\0'))
        {
            return Err(invalid_input(&format!(
                "environment variable {key:?} has an invalid name or value"
            )));
        }
        Ok(())
    }
}

/// Where a child's stdout/stderr go. `None` means the stream is piped and
/// returned in [`ProcessOutput`]; a path means it is appended to that file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OutputCapture {
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
}

/// One subprocess launch. `label` names the step that asked for it and
/// shows up in timeout messages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessSpawnRequest {
    pub task: Option<String>,
    pub plugin: Option<String>,
    pub label: String,
    pub command: CommandSpec,
    pub capture: OutputCapture,
    pub timeout: Option<Duration>,
}

impl ProcessSpawnRequest {
    pub fn new(label: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            task: None,
            plugin: None,
            label: label.into(),
            command,
            capture: OutputCapture::default(),
            timeout: None,
        }
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn capture_to(mut self, stdout: impl Into<PathBuf>, stderr: impl Into<PathBuf>) -> Self {
        self.capture = OutputCapture {
            stdout: Some(stdout.into()),
            stderr: Some(stderr.into()),
        };
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> ExecutionResult<()> {
        self.command.validate().map_err(|error| self.attribute(error))?;

        if let Some(timeout) = self.timeout
            && timeout.is_zero()
        {
            return Err(
                self.attribute(invalid_input("timeout must be greater than zero when provided"))
            );
        }

        Ok(())
    }

    pub(crate) fn attribute(&self, mut error: CoreError) -> CoreError {
        if error.task.is_none() {
            error.task = self.task.clone();
        }
        if error.plugin.is_none() {
            error.plugin = self.plugin.clone();
        }
        error
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessTerminationMode {
    Graceful { grace_period: Duration },
    Immediate,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessExitStatus {
    ExitCode(i32),
    Terminated,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessOutput {
    pub status: ProcessExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
}

pub trait RunningProcess: Send + Sync {
    fn pid(&self) -> Option<u32>;

    fn terminate(&self, mode: ProcessTerminationMode) -> ExecutionResult<()>;

    fn wait(self: Box<Self>) -> ProcessWaitFuture;
}

pub trait ProcessExecutor: Send + Sync {
    fn spawn(&self, request: ProcessSpawnRequest) -> ExecutionResult<Box<dyn RunningProcess>>;
}

pub fn spawn_validated(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
) -> ExecutionResult<Box<dyn RunningProcess>> {
    request.validate()?;
    executor.spawn(request)
}

fn invalid_input(message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
}
