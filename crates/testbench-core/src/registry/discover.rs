use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{PluginCatalog, PluginDescriptor};
use crate::models::{CoreError, CoreErrorKind, CoreResult, PluginCategory, PluginKey};

const FILE_PREFIX: &str = "file";

/// Scans a registry root and pairs every plugin found on disk with its
/// compiled registration.
///
/// Tool roots hold one directory per tool type with `<prefix>_<name>`
/// entries inside; file roots hold `file_<type>` entries directly.
pub fn discover(
    root: &Path,
    category: PluginCategory,
    catalog: &PluginCatalog,
) -> CoreResult<BTreeMap<PluginKey, PluginDescriptor>> {
    if !root.is_dir() {
        return Err(CoreError::new(
            CoreErrorKind::PathNotFound,
            format!("{category} registry '{}' is not a directory", root.display()),
        ));
    }

    let mut found = BTreeMap::new();
    match category {
        PluginCategory::Tool => {
            for type_dir in sorted_entries(root)? {
                if !type_dir.is_dir() {
                    continue;
                }
                let Some(tool_type) = visible_name(&type_dir) else {
                    continue;
                };

                let before = found.len();
                for entry in sorted_entries(&type_dir)? {
                    let Some(stem) = visible_stem(&entry) else {
                        continue;
                    };
                    let name = stem.split_once('_').map_or(stem.as_str(), |(_, name)| name);
                    if name == tool_type {
                        continue;
                    }
                    register(&mut found, PluginKey::tool(&tool_type, name), entry.clone(), catalog);
                }

                if found.len() == before {
                    tracing::warn!(tool_type = %tool_type, "no implementations found for tool type");
                }
            }
        }
        PluginCategory::File => {
            for entry in sorted_entries(root)? {
                let Some(stem) = visible_stem(&entry) else {
                    continue;
                };
                let Some(file_type) = stem
                    .strip_prefix(FILE_PREFIX)
                    .and_then(|rest| rest.strip_prefix('_'))
                else {
                    continue;
                };
                if file_type.is_empty() {
                    continue;
                }
                register(&mut found, PluginKey::file(file_type), entry.clone(), catalog);
            }
        }
    }

    tracing::debug!(
        category = %category,
        root = %root.display(),
        plugins = found.len(),
        "discovered plugins"
    );
    Ok(found)
}

fn register(
    found: &mut BTreeMap<PluginKey, PluginDescriptor>,
    key: PluginKey,
    source: PathBuf,
    catalog: &PluginCatalog,
) {
    let Some(implementation) = catalog.get(&key) else {
        tracing::warn!(plugin = %key, source = %source.display(), "no compiled plugin registered, skipping");
        return;
    };
    found.insert(
        key.clone(),
        PluginDescriptor {
            key,
            implementation: implementation.clone(),
            source: Some(source),
        },
    );
}

fn sorted_entries(dir: &Path) -> CoreResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|error| CoreError::io("failed to read registry", dir, error))?;
    let mut paths = entries
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| CoreError::io("failed to read registry", dir, error))?;
    paths.sort();
    Ok(paths)
}

fn visible_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    (!name.starts_with('_') && !name.starts_with('.')).then(|| name.to_string())
}

fn visible_stem(path: &Path) -> Option<String> {
    let name = visible_name(path)?;
    if path.is_dir() {
        return Some(name);
    }
    path.file_stem()?.to_str().map(str::to_string)
}
