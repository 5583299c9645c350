use std::fmt::{Display, Formatter};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementScope {
    Env,
    Param,
    File,
}

impl RequirementScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Param => "params",
            Self::File => "files",
        }
    }
}

impl Display for RequirementScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    MissingKey,
    PathNotFound,
    UnknownReference,
    InvalidInput,
    ParseFailure,
    Io,
    CommandFailed { exit_code: i32 },
    CommandTimedOut,
    MissingRequirement { scope: RequirementScope, key: String },
    UnknownStep,
    ProcessFailure,
    Internal,
}

impl CoreErrorKind {
    /// Setup errors abort the whole run before any task executes.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::MissingKey
                | Self::PathNotFound
                | Self::UnknownReference
                | Self::InvalidInput
                | Self::ParseFailure
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub task: Option<String>,
    pub plugin: Option<String>,
    pub kind: CoreErrorKind,
    pub message: String,
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            task: None,
            plugin: None,
            kind,
            message: message.into(),
        }
    }

    pub fn io(context: &str, path: &Path, error: std::io::Error) -> Self {
        let kind = if error.kind() == std::io::ErrorKind::NotFound {
            CoreErrorKind::PathNotFound
        } else {
            CoreErrorKind::Io
        };
        Self::new(kind, format!("{context} '{}': {error}", path.display()))
    }

    /// Fills in task attribution unless the error already carries one.
    pub fn for_task(mut self, task: &str) -> Self {
        if self.task.is_none() {
            self.task = Some(task.to_string());
        }
        self
    }

    /// Fills in plugin attribution (`type/name`) unless already present.
    pub fn for_plugin(mut self, plugin_type: &str, name: &str) -> Self {
        if self.plugin.is_none() {
            self.plugin = Some(format!("{plugin_type}/{name}"));
        }
        self
    }

    /// Prefixes the message with the setup phase that produced the error.
    pub fn in_phase(mut self, phase: &str) -> Self {
        self.message = format!("error setting up {phase}: {}", self.message);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{CoreError, CoreErrorKind, RequirementScope};

    #[test]
    fn attribution_does_not_override_existing_values() {
        let error = CoreError::new(CoreErrorKind::UnknownStep, "no step")
            .for_task("first")
            .for_task("second")
            .for_plugin("build", "gcc");

        assert_eq!(error.task.as_deref(), Some("first"));
        assert_eq!(error.plugin.as_deref(), Some("build/gcc"));
    }

    #[test]
    fn io_not_found_maps_to_path_not_found() {
        let error = CoreError::io(
            "failed to read",
            Path::new("/nope"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(error.kind, CoreErrorKind::PathNotFound);

        let error = CoreError::io(
            "failed to read",
            Path::new("/nope"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(error.kind, CoreErrorKind::Io);
    }

    #[test]
    fn display_includes_kind_and_message() {
        let error = CoreError::new(
            CoreErrorKind::MissingRequirement {
                scope: RequirementScope::Env,
                key: "CC".to_string(),
            },
            "tool build/gcc for fw requires CC in env",
        );
        let rendered = error.to_string();
        assert!(rendered.starts_with("MissingRequirement"));
        assert!(rendered.ends_with("requires CC in env"));
    }

    #[test]
    fn setup_kinds_are_classified() {
        assert!(CoreErrorKind::UnknownReference.is_setup());
        assert!(CoreErrorKind::MissingKey.is_setup());
        assert!(!CoreErrorKind::CommandTimedOut.is_setup());
        assert!(!CoreErrorKind::CommandFailed { exit_code: 2 }.is_setup());
    }
}
