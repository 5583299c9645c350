use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::Value;

use crate::models::{CoreError, CoreResult};

/// Immutable environment snapshot loaded from an env file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Loads `KEY=VALUE` lines from `path`. A missing file yields an empty snapshot.
    pub fn load(path: &Path) -> CoreResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no env file, using empty environment");
                Ok(Self::default())
            }
            Err(error) => Err(CoreError::io("failed to read env file", path, error)),
        }
    }

    pub fn parse(contents: &str) -> Self {
        let mut vars = BTreeMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!(line, "ignoring env line without '='");
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            vars.insert(key.to_string(), unquote(value.trim()).to_string());
        }
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Replaces `<key>` placeholders (lowercased variable names) in every
    /// string of `value`.
    pub fn substitute(&self, value: &mut Value) {
        match value {
            Value::String(text) => {
                for (key, replacement) in &self.vars {
                    let placeholder = format!("<{}>", key.to_lowercase());
                    if text.contains(&placeholder) {
                        *text = text.replace(&placeholder, replacement);
                    }
                }
            }
            Value::Sequence(items) => items.iter_mut().for_each(|item| self.substitute(item)),
            Value::Mapping(mapping) => mapping
                .values_mut()
                .for_each(|item| self.substitute(item)),
            Value::Tagged(tagged) => self.substitute(&mut tagged.value),
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }

    /// Renders the snapshot back into env-file form.
    pub fn render(&self) -> String {
        self.vars
            .iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect()
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
