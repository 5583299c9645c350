use std::path::{Path, PathBuf};

use serde_yaml::Value;
use serde_yaml::value::Tag;

use crate::models::{CoreError, CoreErrorKind, CoreResult};

const MAX_INCLUDE_DEPTH: usize = 16;

pub(crate) fn read_document(path: &Path) -> CoreResult<Value> {
    let contents = std::fs::read_to_string(path)
        .map_err(|error| CoreError::io("failed to read configuration", path, error))?;
    serde_yaml::from_str(&contents).map_err(|error| {
        CoreError::new(
            CoreErrorKind::ParseFailure,
            format!("error loading configuration '{}': {error}", path.display()),
        )
    })
}

/// Replaces every `!inc <path>` node with the document it names. Relative
/// paths resolve against the directory of the including file.
pub(crate) fn expand_includes(
    value: Value,
    base_dir: &Path,
    included: &mut Vec<PathBuf>,
) -> CoreResult<Value> {
    expand(value, base_dir, included, 0)
}

fn expand(
    value: Value,
    base_dir: &Path,
    included: &mut Vec<PathBuf>,
    depth: usize,
) -> CoreResult<Value> {
    match value {
        Value::Tagged(tagged) if tagged.tag == Tag::new("inc") => {
            let Some(target) = tagged.value.as_str() else {
                return Err(CoreError::new(
                    CoreErrorKind::InvalidInput,
                    "!inc expects a file path",
                ));
            };
            if depth >= MAX_INCLUDE_DEPTH {
                return Err(CoreError::new(
                    CoreErrorKind::InvalidInput,
                    format!("include depth exceeded while including '{target}'"),
                ));
            }

            let path = base_dir.join(target);
            tracing::debug!(include = %path.display(), "expanding include");
            let document = read_document(&path)?;
            included.push(path.clone());

            let nested_base = path.parent().unwrap_or(base_dir).to_path_buf();
            expand(document, &nested_base, included, depth + 1)
        }
        Value::Tagged(mut tagged) => {
            let inner = std::mem::take(&mut tagged.value);
            tagged.value = expand(inner, base_dir, included, depth)?;
            Ok(Value::Tagged(tagged))
        }
        Value::Mapping(mapping) => {
            let mut expanded = serde_yaml::Mapping::with_capacity(mapping.len());
            for (key, item) in mapping {
                expanded.insert(key, expand(item, base_dir, included, depth)?);
            }
            Ok(Value::Mapping(expanded))
        }
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| expand(item, base_dir, included, depth))
            .collect::<CoreResult<Vec<_>>>()
            .map(Value::Sequence),
        other => Ok(other),
    }
}
