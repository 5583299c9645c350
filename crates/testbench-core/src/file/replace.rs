use indexmap::IndexMap;

/// Line-scoped substitutions produced by a file format's `parse` hook:
/// token → ordered list of `(line index, replacement)`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Replacements {
    entries: IndexMap<String, Vec<(usize, String)>>,
}

impl Replacements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, line: usize, value: impl Into<String>) {
        self.entries
            .entry(token.into())
            .or_default()
            .push((line, value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[(usize, String)])> {
        self.entries
            .iter()
            .map(|(token, targets)| (token.as_str(), targets.as_slice()))
    }

    /// Applies every replacement on its designated line only. Identical text
    /// on any other line is left untouched. Line endings are preserved.
    pub fn apply(&self, content: &str) -> String {
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let mut patched: Vec<String> = lines.iter().map(|line| line.to_string()).collect();

        for (token, targets) in &self.entries {
            let token = token.trim();
            if token.is_empty() {
                tracing::warn!("ignoring replacement with an empty search token");
                continue;
            }

            for (line, value) in targets {
                match patched.get_mut(*line) {
                    Some(text) => *text = text.replace(token, value.trim()),
                    None => tracing::warn!(
                        token,
                        line,
                        line_count = lines.len(),
                        "replacement line index is out of range"
                    ),
                }
            }
        }

        patched.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::Replacements;

    #[test]
    fn replaces_only_on_designated_line() {
        let content = "#define SPEED 10\nint speed = 10;\n#define SPEED 10\n";
        let mut replacements = Replacements::new();
        replacements.insert("10", 2, "42");

        let patched = replacements.apply(content);

        assert_eq!(patched, "#define SPEED 10\nint speed = 10;\n#define SPEED 42\n");
    }

    #[test]
    fn trims_token_and_value_before_replacing() {
        let mut replacements = Replacements::new();
        replacements.insert("  OLD ", 0, " NEW\n");

        assert_eq!(replacements.apply("value OLD\n"), "value NEW\n");
    }

    #[test]
    fn multiple_targets_for_one_token_are_all_applied() {
        let mut replacements = Replacements::new();
        replacements.insert("x", 0, "a");
        replacements.insert("x", 2, "c");

        assert_eq!(replacements.apply("x\nx\nx"), "a\nx\nc");
        assert_eq!(replacements.len(), 2);
    }

    #[test]
    fn out_of_range_and_empty_tokens_are_ignored() {
        let mut replacements = Replacements::new();
        replacements.insert("a", 7, "b");
        replacements.insert("   ", 0, "b");

        assert_eq!(replacements.apply("a\r\na\r\n"), "a\r\na\r\n");
    }
}
