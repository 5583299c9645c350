use serde_yaml::{Mapping, Value};

use crate::file::{FileFormat, FileSpec, Replacements};
use crate::models::{CoreError, CoreErrorKind, CoreResult};

const DEFAULT_EXTENSION: &str = "h";

/// C header whose `#define NAME value` lines are rewritten from
/// `configs.defines`.
#[derive(Clone, Debug, PartialEq)]
pub struct DefineFile {
    extension: String,
    defines: Vec<(String, String)>,
}

impl DefineFile {
    pub fn from_spec(spec: &FileSpec) -> CoreResult<Self> {
        let extension = match spec.configs.get("extension") {
            None | Some(Value::Null) => DEFAULT_EXTENSION.to_string(),
            Some(value) => value
                .as_str()
                .map(|extension| extension.trim_start_matches('.').to_string())
                .ok_or_else(|| invalid("configs/extension must be a string"))?,
        };

        let defines = match spec.configs.get("defines") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Mapping(defines)) => collect_defines(defines)?,
            Some(_) => return Err(invalid("configs/defines must be a mapping")),
        };

        Ok(Self { extension, defines })
    }
}

impl FileFormat for DefineFile {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn parse(&mut self, lines: &[&str]) -> CoreResult<Replacements> {
        let mut replacements = Replacements::new();
        for (name, value) in &self.defines {
            let mut found = false;
            for (index, line) in lines.iter().enumerate() {
                let Some((defined, token)) = definition(line) else {
                    continue;
                };
                if defined == name {
                    replacements.insert(token, index, format!("{name} {value}"));
                    found = true;
                }
            }
            if !found {
                tracing::warn!(define = %name, "no #define with a value found for configured name");
            }
        }
        Ok(replacements)
    }
}

/// Splits `#define NAME value` into the name and the `NAME value` span,
/// leaving trailing comments out of the span.
fn definition(line: &str) -> Option<(&str, &str)> {
    let body = line
        .trim_start()
        .strip_prefix('#')?
        .trim_start()
        .strip_prefix("define")?;
    if !body.starts_with([' ', '\t']) {
        return None;
    }
    let body = body.trim_start();

    let name_end = body.find(char::is_whitespace)?;
    let name = &body[..name_end];
    if name.contains('(') {
        return None;
    }

    let rest = &body[name_end..];
    let rest = [rest.find("//"), rest.find("/*")]
        .into_iter()
        .flatten()
        .min()
        .map_or(rest, |comment| &rest[..comment]);
    let value = rest.trim();
    if value.is_empty() {
        return None;
    }

    let value_start = name_end + (rest.len() - rest.trim_start().len());
    Some((name, &body[..value_start + value.len()]))
}

fn collect_defines(defines: &Mapping) -> CoreResult<Vec<(String, String)>> {
    defines
        .iter()
        .map(|(name, value)| {
            let name = name
                .as_str()
                .ok_or_else(|| invalid("configs/defines keys must be strings"))?;
            let value = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => u8::from(*flag).to_string(),
                _ => return Err(invalid(&format!("configs/defines/{name} must be a scalar"))),
            };
            Ok((name.to_string(), value))
        })
        .collect()
}

fn invalid(message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{DefineFile, definition};
    use crate::file::{FileFormat, FileSpec};

    fn spec(configs: &str) -> FileSpec {
        FileSpec {
            path: PathBuf::from("/src"),
            configs: serde_yaml::from_str(configs).unwrap(),
            output_dir: PathBuf::from("/out"),
            name: None,
        }
    }

    #[test]
    fn definition_span_excludes_comments() {
        assert_eq!(
            definition("#define BAUD   9600 // default"),
            Some(("BAUD", "BAUD   9600"))
        );
        assert_eq!(definition("  #  define DEBUG 1"), Some(("DEBUG", "DEBUG 1")));
        assert_eq!(definition("#define GUARD_H"), None);
        assert_eq!(definition("#define MAX(a, b) ((a) > (b))"), None);
        assert_eq!(definition("#defined X 1"), None);
    }

    #[test]
    fn replaces_only_the_configured_definition_line() {
        let mut format =
            DefineFile::from_spec(&spec("defines: { BAUD: 115200, DEBUG: true }")).unwrap();
        let text = "#define BAUD 9600\n// BAUD 9600 is the fallback\n#define DEBUG 0\n";
        let lines: Vec<&str> = text.lines().collect();

        let replacements = format.parse(&lines).unwrap();
        let patched = replacements.apply(text);

        assert_eq!(
            patched,
            "#define BAUD 115200\n// BAUD 9600 is the fallback\n#define DEBUG 1\n"
        );
    }

    #[test]
    fn extension_defaults_to_header() {
        assert_eq!(DefineFile::from_spec(&spec("{}")).unwrap().extension(), "h");
        assert_eq!(
            DefineFile::from_spec(&spec("extension: .hpp")).unwrap().extension(),
            "hpp"
        );
        assert!(DefineFile::from_spec(&spec("defines: [A]")).is_err());
    }
}
