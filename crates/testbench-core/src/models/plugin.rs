use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PluginCategory {
    Tool,
    File,
}

impl PluginCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::File => "file",
        }
    }
}

impl Display for PluginCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identity of a plugin. File plugins are keyed by type alone, so
/// their `name` always equals their `plugin_type`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PluginKey {
    pub category: PluginCategory,
    pub plugin_type: String,
    pub name: String,
}

impl PluginKey {
    pub fn tool(tool_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: PluginCategory::Tool,
            plugin_type: tool_type.into(),
            name: name.into(),
        }
    }

    pub fn file(file_type: impl Into<String>) -> Self {
        let file_type = file_type.into();
        Self {
            category: PluginCategory::File,
            name: file_type.clone(),
            plugin_type: file_type,
        }
    }
}

impl Display for PluginKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.category {
            PluginCategory::Tool => write!(f, "tool {}/{}", self.plugin_type, self.name),
            PluginCategory::File => write!(f, "file {}", self.plugin_type),
        }
    }
}
