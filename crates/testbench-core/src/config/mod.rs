pub mod env;
mod include;

pub use env::EnvSnapshot;

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use crate::models::{CoreError, CoreErrorKind, CoreResult};

/// A configuration document with its includes expanded.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub document: Value,
    pub includes: Vec<PathBuf>,
}

pub fn load_config(path: &Path) -> CoreResult<LoadedConfig> {
    if !path.exists() {
        return Err(CoreError::new(
            CoreErrorKind::PathNotFound,
            format!("configuration file '{}' does not exist", path.display()),
        ));
    }
    let path = std::path::absolute(path)
        .map_err(|error| CoreError::io("failed to resolve", path, error))?;

    let document = include::read_document(&path)?;
    if document.is_null() {
        return Err(CoreError::new(
            CoreErrorKind::ParseFailure,
            format!("configuration '{}' is empty", path.display()),
        ));
    }

    let mut includes = Vec::new();
    let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let document = include::expand_includes(document, &base_dir, &mut includes)?;

    Ok(LoadedConfig {
        path,
        document,
        includes,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegistryConfig {
    pub tools: PathBuf,
    pub files: PathBuf,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TaskConfig {
    pub path: Option<PathBuf>,
    pub tools: Option<IndexMap<String, Option<IndexMap<String, Option<Mapping>>>>>,
    pub files: Option<IndexMap<String, FileConfig>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct FileConfig {
    pub path: Option<PathBuf>,
    pub configs: Option<Value>,
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ScheduleEntry {
    pub order: Option<i64>,
    pub steps: Option<IndexMap<String, String>>,
    pub cleanup: Option<IndexMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default subprocess timeout in seconds.
    pub command_timeout: Option<u64>,
}

impl Settings {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs)
    }
}

/// Typed view of the sections the engine consumes.
#[derive(Clone, Debug, PartialEq)]
pub struct TestbenchConfig {
    pub registry: RegistryConfig,
    pub tasks: IndexMap<String, TaskConfig>,
    pub schedule: IndexMap<String, ScheduleEntry>,
    pub settings: Settings,
}

impl TestbenchConfig {
    pub fn from_value(document: &Value) -> CoreResult<Self> {
        let registry = RegistryConfig {
            tools: decode(require(document, "registry/tools")?, "registry/tools")?,
            files: decode(require(document, "registry/files")?, "registry/files")?,
        };

        let tasks = decode_entries::<TaskConfig>(require(document, "tasks")?, "tasks")?;
        let schedule = decode_entries::<ScheduleEntry>(require(document, "schedule")?, "schedule")?;

        let settings = match document.get("settings") {
            Some(value) if !value.is_null() => decode(value, "settings")?,
            _ => Settings::default(),
        };

        Ok(Self {
            registry,
            tasks,
            schedule,
            settings,
        })
    }
}

/// Looks up a slash-separated key path, failing with `MissingKey`.
pub fn require<'a>(document: &'a Value, key: &str) -> CoreResult<&'a Value> {
    let mut current = document;
    for part in key.split('/') {
        current = current.get(part).ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::MissingKey,
                format!("key \"{part}\" not found in configuration ({key})"),
            )
        })?;
    }
    Ok(current)
}

fn decode<T: DeserializeOwned>(value: &Value, key: &str) -> CoreResult<T> {
    serde_yaml::from_value(value.clone()).map_err(|error| {
        CoreError::new(
            CoreErrorKind::ParseFailure,
            format!("invalid configuration at '{key}': {error}"),
        )
    })
}

fn decode_entries<T: DeserializeOwned + Default>(
    value: &Value,
    key: &str,
) -> CoreResult<IndexMap<String, T>> {
    if value.is_null() {
        return Ok(IndexMap::new());
    }

    let entries: IndexMap<String, Option<T>> = decode(value, key)?;
    Ok(entries
        .into_iter()
        .map(|(name, entry)| (name, entry.unwrap_or_default()))
        .collect())
}
