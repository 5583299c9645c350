use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_yaml::{Mapping, Value};

use crate::config::EnvSnapshot;
use crate::execution::{
    CommandSpec, ProcessExecutor, ProcessExitStatus, ProcessSpawnRequest, spawn_validated,
};
use crate::file::{FileSession, TaskFiles};
use crate::models::{
    CoreError, CoreErrorKind, CoreResult, RequirementScope, Task, ToolBinding,
};
use crate::orchestration::ExecutionContext;
use crate::output::header_timestamp;

/// Param that overrides the run-wide command timeout for one tool, in seconds.
pub const COMMAND_TIMEOUT_PARAM: &str = "command_timeout";

const HEADER_RULE_WIDTH: usize = 45;

/// A value obtained through [`ToolRuntime::ensure`].
#[derive(Debug)]
pub enum Requirement<'a> {
    Env(&'a str),
    Param(&'a Value),
    File(&'a FileSession),
}

/// Execution context a tool plugin runs inside for one task.
pub struct ToolRuntime {
    tool_type: String,
    tool_name: String,
    task_name: String,
    task_path: PathBuf,
    output_dir: PathBuf,
    params: Mapping,
    env: Arc<EnvSnapshot>,
    files: Arc<TaskFiles>,
    executor: Arc<dyn ProcessExecutor>,
    handle: tokio::runtime::Handle,
    command_timeout: Option<Duration>,
}

impl ToolRuntime {
    pub fn new(
        task: &Task,
        tool_type: &str,
        binding: &ToolBinding,
        files: Arc<TaskFiles>,
        context: &ExecutionContext,
    ) -> CoreResult<Self> {
        let output_dir = task
            .output_dir
            .join(format!("{tool_type}_{}", binding.name));
        std::fs::create_dir_all(&output_dir).map_err(|error| {
            CoreError::io("failed to create tool output directory", &output_dir, error)
                .for_task(&task.name)
                .for_plugin(tool_type, &binding.name)
        })?;

        let command_timeout = match binding.params.get(COMMAND_TIMEOUT_PARAM) {
            Some(value) => Some(parse_timeout(value).map_err(|error| {
                error.for_task(&task.name).for_plugin(tool_type, &binding.name)
            })?),
            None => context.command_timeout,
        };

        Ok(Self {
            tool_type: tool_type.to_string(),
            tool_name: binding.name.clone(),
            task_name: task.name.clone(),
            task_path: task.path.clone(),
            output_dir,
            params: binding.params.clone(),
            env: context.env.clone(),
            files,
            executor: context.executor.clone(),
            handle: context.handle.clone(),
            command_timeout,
        })
    }

    pub fn tool_type(&self) -> &str {
        &self.tool_type
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn task_path(&self) -> &Path {
        &self.task_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn params(&self) -> &Mapping {
        &self.params
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    /// Looks `key` up in one of the three scopes a plugin may read from.
    pub fn ensure(&self, scope: RequirementScope, key: &str) -> CoreResult<Requirement<'_>> {
        let found = match scope {
            RequirementScope::Env => self.env.get(key).map(Requirement::Env),
            RequirementScope::Param => self.params.get(key).map(Requirement::Param),
            RequirementScope::File => self.files.get(key).map(Requirement::File),
        };
        found.ok_or_else(|| self.missing(scope, key))
    }

    pub fn ensure_env(&self, key: &str) -> CoreResult<&str> {
        self.env
            .get(key)
            .ok_or_else(|| self.missing(RequirementScope::Env, key))
    }

    pub fn ensure_param(&self, key: &str) -> CoreResult<&Value> {
        self.params
            .get(key)
            .ok_or_else(|| self.missing(RequirementScope::Param, key))
    }

    pub fn ensure_param_str(&self, key: &str) -> CoreResult<&str> {
        self.ensure_param(key)?.as_str().ok_or_else(|| {
            self.attributed(
                CoreErrorKind::InvalidInput,
                format!(
                    "tool {}/{} for {} expects param {key} to be a string",
                    self.tool_type, self.tool_name, self.task_name
                ),
            )
        })
    }

    pub fn ensure_file(&self, key: &str) -> CoreResult<&FileSession> {
        self.files
            .get(key)
            .ok_or_else(|| self.missing(RequirementScope::File, key))
    }

    /// Paths of the stdout and stderr capture files for `label`.
    pub fn capture_paths(&self, label: &str) -> (PathBuf, PathBuf) {
        let prefix = format!("{}_{}_{label}", self.tool_type, self.tool_name);
        (
            self.output_dir.join(format!("{prefix}_stdout.txt")),
            self.output_dir.join(format!("{prefix}_stderr.txt")),
        )
    }

    /// Runs `command` through the shell inside the task path, capturing its
    /// output into the tool's output directory. Uses the tool's allotted
    /// timeout, if any.
    pub fn run_command(&self, command: &str, label: &str) -> CoreResult<()> {
        self.execute(command, label, self.command_timeout)
    }

    pub fn run_command_with_timeout(
        &self,
        command: &str,
        label: &str,
        timeout: Duration,
    ) -> CoreResult<()> {
        self.execute(command, label, Some(timeout))
    }

    fn execute(&self, command: &str, label: &str, timeout: Option<Duration>) -> CoreResult<()> {
        tracing::debug!(
            task = %self.task_name,
            tool_type = %self.tool_type,
            tool_name = %self.tool_name,
            label,
            command,
            "running command"
        );

        let (stdout_file, stderr_file) = self.capture_paths(label);
        write_capture_header(&stdout_file, "stdout", command)
            .and_then(|()| write_capture_header(&stderr_file, "stderr", command))
            .map_err(|error| self.attribute(error))?;

        tracing::debug!(
            stdout = %stdout_file.display(),
            stderr = %stderr_file.display(),
            "redirecting {label} output"
        );

        let spec = CommandSpec::shell(command)
            .working_dir(&self.task_path)
            .envs(self.env.iter());
        let mut request = ProcessSpawnRequest::new(label, spec)
            .task(&self.task_name)
            .plugin(format!("{}/{}", self.tool_type, self.tool_name))
            .capture_to(stdout_file, stderr_file);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // Child processes register with the runtime's reactor on spawn.
        let _runtime = self.handle.enter();
        let process = spawn_validated(self.executor.as_ref(), request)?;
        let output = self.handle.block_on(process.wait())?;

        match output.status {
            ProcessExitStatus::ExitCode(0) => Ok(()),
            ProcessExitStatus::ExitCode(code) => Err(self.attributed(
                CoreErrorKind::CommandFailed { exit_code: code },
                format!("{label} command failed with code {code}"),
            )),
            ProcessExitStatus::Terminated => Err(self.attributed(
                CoreErrorKind::CommandFailed { exit_code: -1 },
                format!("{label} command was terminated by a signal"),
            )),
        }
    }

    fn missing(&self, scope: RequirementScope, key: &str) -> CoreError {
        self.attributed(
            CoreErrorKind::MissingRequirement {
                scope,
                key: key.to_string(),
            },
            format!(
                "tool {}/{} for {} requires {key} in {scope}",
                self.tool_type, self.tool_name, self.task_name
            ),
        )
    }

    fn attributed(&self, kind: CoreErrorKind, message: String) -> CoreError {
        self.attribute(CoreError::new(kind, message))
    }

    fn attribute(&self, error: CoreError) -> CoreError {
        error
            .for_task(&self.task_name)
            .for_plugin(&self.tool_type, &self.tool_name)
    }
}

fn write_capture_header(path: &Path, stream: &str, command: &str) -> CoreResult<()> {
    let mut file =
        File::create(path).map_err(|error| CoreError::io("failed to create capture file", path, error))?;
    let header = format!(
        "{stream}\ncommand: {command}\nTime: {}\n{}\n\n",
        header_timestamp(),
        "-".repeat(HEADER_RULE_WIDTH)
    );
    file.write_all(header.as_bytes())
        .map_err(|error| CoreError::io("failed to write capture header", path, error))
}

fn parse_timeout(value: &Value) -> CoreResult<Duration> {
    let invalid = || {
        CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("param {COMMAND_TIMEOUT_PARAM} must be a positive number of seconds"),
        )
    };
    let seconds = value
        .as_u64()
        .map(|seconds| seconds as f64)
        .or_else(|| value.as_f64())
        .filter(|seconds| *seconds > 0.0)
        .ok_or_else(invalid)?;
    Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use serde_yaml::Value;

    use super::parse_timeout;
    use crate::models::CoreErrorKind;

    #[test]
    fn timeout_param_accepts_integer_and_fractional_seconds() {
        assert_eq!(parse_timeout(&Value::from(3)).unwrap().as_secs(), 3);
        assert_eq!(parse_timeout(&Value::from(0.5)).unwrap().as_millis(), 500);
    }

    #[test]
    fn timeout_param_rejects_non_positive_and_oversized_values() {
        let error = parse_timeout(&Value::from(0)).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);

        let error = parse_timeout(&Value::from("soon")).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);

        let error = parse_timeout(&Value::from(1.0e20)).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);

        let error = parse_timeout(&Value::from(f64::INFINITY)).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }
}
