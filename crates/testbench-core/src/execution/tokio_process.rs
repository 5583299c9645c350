use std::fs::OpenOptions;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::execution::{
    ExecutionResult, ProcessExecutor, ProcessExitStatus, ProcessOutput, ProcessSpawnRequest,
    ProcessTerminationMode, ProcessWaitFuture, RunningProcess,
};
use crate::models::{CoreError, CoreErrorKind};

/// How long piped output is still collected after the child has exited.
/// Background descendants may keep the pipe open indefinitely.
const DRAIN_WINDOW: Duration = Duration::from_millis(250);

/// How long a timed-out child gets to be reaped after `SIGKILL`.
const REAP_WINDOW: Duration = Duration::from_secs(1);

/// Spawns children in their own process group so a timeout or terminate
/// reaches everything the shell started.
pub struct TokioProcessExecutor;

impl ProcessExecutor for TokioProcessExecutor {
    fn spawn(&self, request: ProcessSpawnRequest) -> ExecutionResult<Box<dyn RunningProcess>> {
        let command = &request.command;
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(output_target(&request, request.capture.stdout.as_deref())?)
            .stderr(output_target(&request, request.capture.stderr.as_deref())?)
            .process_group(0);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|error| {
            request.attribute(CoreError::new(
                CoreErrorKind::ProcessFailure,
                format!(
                    "failed to spawn {} for {}: {error}",
                    command.program.display(),
                    request.label
                ),
            ))
        })?;
        tracing::trace!(pid = ?child.id(), label = %request.label, "spawned process");

        Ok(Box::new(TokioRunningProcess {
            pid: child.id(),
            child: Mutex::new(Some(child)),
            started_at: SystemTime::now(),
            timeout: request.timeout,
            task: request.task,
            plugin: request.plugin,
            label: request.label,
        }))
    }
}

/// A capture path is opened for append; without one the stream is piped.
fn output_target(request: &ProcessSpawnRequest, capture: Option<&Path>) -> ExecutionResult<Stdio> {
    let Some(path) = capture else {
        return Ok(Stdio::piped());
    };

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(Stdio::from)
        .map_err(|error| request.attribute(CoreError::io("failed to open capture file", path, error)))
}

struct TokioRunningProcess {
    child: Mutex<Option<tokio::process::Child>>,
    pid: Option<u32>,
    started_at: SystemTime,
    timeout: Option<Duration>,
    task: Option<String>,
    plugin: Option<String>,
    label: String,
}

impl TokioRunningProcess {
    fn failure(&self, kind: CoreErrorKind, message: String) -> CoreError {
        CoreError {
            task: self.task.clone(),
            plugin: self.plugin.clone(),
            kind,
            message,
        }
    }
}

impl RunningProcess for TokioRunningProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn terminate(&self, mode: ProcessTerminationMode) -> ExecutionResult<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };

        let signal = match mode {
            ProcessTerminationMode::Immediate => libc::SIGKILL,
            ProcessTerminationMode::Graceful { .. } => libc::SIGTERM,
        };

        signal_group(pid, signal).map_err(|error| {
            self.failure(
                CoreErrorKind::ProcessFailure,
                format!("failed to signal process group {pid} of {}: {error}", self.label),
            )
        })
    }

    fn wait(self: Box<Self>) -> ProcessWaitFuture {
        let this = *self;
        let child = this.child.lock().ok().and_then(|mut slot| slot.take());

        Box::pin(async move {
            let Some(mut child) = child else {
                return Err(this.failure(
                    CoreErrorKind::Internal,
                    format!("{} process was already awaited", this.label),
                ));
            };

            let stdout = child.stdout.take().map(drain);
            let stderr = child.stderr.take().map(drain);

            let waited = match this.timeout {
                Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
                None => Some(child.wait().await),
            };

            let Some(status) = waited else {
                if let Some(pid) = this.pid
                    && let Err(error) = signal_group(pid, libc::SIGKILL)
                {
                    tracing::warn!(pid, %error, "failed to kill timed out process group");
                }
                let _ = tokio::time::timeout(REAP_WINDOW, child.wait()).await;
                stdout.into_iter().chain(stderr).for_each(|reader| reader.abort());

                let limit = this.timeout.unwrap_or_default();
                return Err(this.failure(
                    CoreErrorKind::CommandTimedOut,
                    format!("{} command timed out after {}ms", this.label, limit.as_millis()),
                ));
            };

            let status = status.map_err(|error| {
                this.failure(
                    CoreErrorKind::ProcessFailure,
                    format!("failed to wait for {} process: {error}", this.label),
                )
            })?;

            Ok(ProcessOutput {
                status: status
                    .code()
                    .map_or(ProcessExitStatus::Terminated, ProcessExitStatus::ExitCode),
                stdout: collect(stdout).await,
                stderr: collect(stderr).await,
                started_at: this.started_at,
                finished_at: SystemTime::now(),
            })
        })
    }
}

fn drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer).await;
        buffer
    })
}

async fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(reader) = reader else {
        return Vec::new();
    };
    match tokio::time::timeout(DRAIN_WINDOW, reader).await {
        Ok(Ok(buffer)) => buffer,
        _ => Vec::new(),
    }
}

/// Sends `signal` to the whole process group led by `pid`. A group that is
/// already gone is not an error.
fn signal_group(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    let pgid = -(pid as libc::pid_t);
    // SAFETY: kill(2) has no memory-safety preconditions.
    if unsafe { libc::kill(pgid, signal) } == 0 {
        return Ok(());
    }
    let error = std::io::Error::last_os_error();
    if error.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(error)
    }
}
