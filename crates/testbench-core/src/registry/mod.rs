mod discover;

pub use discover::discover;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::file::{FileFactory, FileFormat, FileSession, FileSpec};
use crate::models::{CoreError, CoreErrorKind, CoreResult, PluginCategory, PluginKey};
use crate::tool::{StepTable, Tool, ToolFactory, ToolInstance, ToolRuntime, factory_for};

#[derive(Clone)]
pub struct ToolRegistration {
    factory: ToolFactory,
    steps: StepTable,
}

impl ToolRegistration {
    pub fn steps(&self) -> &StepTable {
        &self.steps
    }
}

#[derive(Clone)]
pub struct FileRegistration {
    factory: FileFactory,
}

impl std::fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistration").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for FileRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRegistration").finish_non_exhaustive()
    }
}

/// The compiled code behind a plugin key.
#[derive(Clone)]
pub enum PluginImplementation {
    Tool(ToolRegistration),
    File(FileRegistration),
}

#[derive(Clone)]
pub struct PluginDescriptor {
    pub key: PluginKey,
    pub implementation: PluginImplementation,
    /// Where the plugin was discovered; `None` for catalog-only registries.
    pub source: Option<PathBuf>,
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("key", &self.key)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Compile-time table of every plugin the binary knows how to construct.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    entries: BTreeMap<PluginKey, PluginImplementation>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool<T: Tool>(&mut self, tool_type: &str, name: &str) -> &mut Self {
        let registration = ToolRegistration {
            factory: factory_for::<T>(),
            steps: StepTable::for_tool::<T>(),
        };
        self.insert(
            PluginKey::tool(tool_type, name),
            PluginImplementation::Tool(registration),
        );
        self
    }

    pub fn register_file<F>(&mut self, file_type: &str, factory: F) -> &mut Self
    where
        F: Fn(&FileSpec) -> CoreResult<Box<dyn FileFormat>> + Send + Sync + 'static,
    {
        let registration = FileRegistration {
            factory: Arc::new(factory),
        };
        self.insert(
            PluginKey::file(file_type),
            PluginImplementation::File(registration),
        );
        self
    }

    pub fn get(&self, key: &PluginKey) -> Option<&PluginImplementation> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PluginKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, key: PluginKey, implementation: PluginImplementation) {
        if self.entries.insert(key.clone(), implementation).is_some() {
            tracing::warn!(plugin = %key, "plugin registered twice, keeping the last registration");
        }
    }
}

/// Plugins available to one run, resolved by key.
#[derive(Clone, Debug, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<PluginKey, PluginDescriptor>,
}

impl PluginRegistry {
    /// Scans both registry roots and keeps the plugins present on disk.
    pub fn discover(tool_root: &Path, file_root: &Path, catalog: &PluginCatalog) -> CoreResult<Self> {
        let mut plugins = discover(tool_root, PluginCategory::Tool, catalog)?;
        plugins.extend(discover(file_root, PluginCategory::File, catalog)?);
        tracing::debug!(plugins = plugins.len(), "plugin registry ready");
        Ok(Self::from_descriptors(plugins))
    }

    pub fn from_descriptors(plugins: BTreeMap<PluginKey, PluginDescriptor>) -> Self {
        Self { plugins }
    }

    /// Exposes every catalog entry without touching the filesystem.
    pub fn from_catalog(catalog: &PluginCatalog) -> Self {
        let plugins = catalog
            .entries
            .iter()
            .map(|(key, implementation)| {
                (
                    key.clone(),
                    PluginDescriptor {
                        key: key.clone(),
                        implementation: implementation.clone(),
                        source: None,
                    },
                )
            })
            .collect();
        Self { plugins }
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.plugins.values()
    }

    pub fn contains(&self, key: &PluginKey) -> bool {
        self.plugins.contains_key(key)
    }

    pub fn has_tool_type(&self, tool_type: &str) -> bool {
        self.plugins
            .keys()
            .any(|key| key.category == PluginCategory::Tool && key.plugin_type == tool_type)
    }

    pub fn tool(&self, tool_type: &str, name: &str) -> CoreResult<&ToolRegistration> {
        let key = PluginKey::tool(tool_type, name);
        match self.plugins.get(&key).map(|descriptor| &descriptor.implementation) {
            Some(PluginImplementation::Tool(registration)) => Ok(registration),
            _ => Err(unknown(&key)),
        }
    }

    pub fn file(&self, file_type: &str) -> CoreResult<&FileRegistration> {
        let key = PluginKey::file(file_type);
        match self.plugins.get(&key).map(|descriptor| &descriptor.implementation) {
            Some(PluginImplementation::File(registration)) => Ok(registration),
            _ => Err(unknown(&key)),
        }
    }

    pub(crate) fn instantiate_tool(&self, runtime: ToolRuntime) -> CoreResult<ToolInstance> {
        let registration = self.tool(runtime.tool_type(), runtime.tool_name())?;
        ToolInstance::create(&registration.factory, registration.steps.clone(), runtime)
    }

    pub(crate) fn open_file(&self, file_type: &str, spec: &FileSpec) -> CoreResult<FileSession> {
        let registration = self.file(file_type)?;
        let format = (registration.factory)(spec)
            .map_err(|error| error.for_plugin("file", file_type))?;
        FileSession::open(file_type, spec, format)
            .map_err(|error| error.for_plugin("file", file_type))
    }
}

fn unknown(key: &PluginKey) -> CoreError {
    CoreError::new(
        CoreErrorKind::UnknownReference,
        format!("{key} is not registered"),
    )
}
