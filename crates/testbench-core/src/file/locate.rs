use std::path::{Path, PathBuf};

use crate::models::{CoreError, CoreErrorKind, CoreResult};

/// Resolves the file a session patches.
///
/// A `path` that is already a file is used as-is. Otherwise `path` must be a
/// directory holding exactly one `*.extension` file, or, when `name` is
/// given, a file whose stem equals `name`.
pub fn locate_file(path: &Path, extension: &str, name: Option<&str>) -> CoreResult<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    if !path.is_dir() {
        return Err(CoreError::new(
            CoreErrorKind::PathNotFound,
            format!("path '{}' does not exist", path.display()),
        ));
    }

    let extension = extension.trim_start_matches('.');
    let entries = std::fs::read_dir(path)
        .map_err(|error| CoreError::io("failed to read directory", path, error))?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|candidate| candidate.is_file())
        .filter(|candidate| {
            candidate.extension().and_then(|ext| ext.to_str()) == Some(extension)
        })
        .filter(|candidate| match name {
            Some(name) => candidate.file_stem().and_then(|stem| stem.to_str()) == Some(name),
            None => true,
        })
        .collect();
    candidates.sort();

    let described = match name {
        Some(name) => format!("'{name}.{extension}'"),
        None => format!("'*.{extension}'"),
    };

    match candidates.len() {
        0 => Err(CoreError::new(
            CoreErrorKind::PathNotFound,
            format!("no file matching {described} in '{}'", path.display()),
        )),
        1 => Ok(candidates.remove(0)),
        count => Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            format!(
                "{count} files match {described} in '{}'; set a file name to disambiguate",
                path.display()
            ),
        )),
    }
}
