use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use crate::tool::StepHandler;

#[derive(Clone, Debug, PartialEq)]
pub struct ToolBinding {
    pub name: String,
    pub params: Mapping,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileBinding {
    pub path: PathBuf,
    pub configs: Value,
    pub name: Option<String>,
}

/// One scheduled invocation of a tool step. The handler comes from the
/// plugin's step table and is resolved when the schedule is built; the tool
/// instance it runs against is only bound once the task starts.
#[derive(Clone)]
pub struct Step {
    pub tool_type: String,
    pub tool_name: String,
    pub function: String,
    pub(crate) handler: StepHandler,
}

impl Step {
    pub fn label(&self) -> String {
        format!("{}/{}", self.tool_type, self.function)
    }
}

impl Debug for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("tool_type", &self.tool_type)
            .field("tool_name", &self.tool_name)
            .field("function", &self.function)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct Task {
    pub name: String,
    pub path: PathBuf,
    pub output_dir: PathBuf,
    pub tools: IndexMap<String, ToolBinding>,
    pub files: IndexMap<String, FileBinding>,
    pub order: Option<i64>,
    pub steps: Vec<Step>,
    pub cleanup: Vec<Step>,
}

impl Task {
    /// Tool types used by at least one main or cleanup step, in first-use order.
    pub fn referenced_tool_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = Vec::new();
        for step in self.steps.iter().chain(self.cleanup.iter()) {
            if !types.contains(&step.tool_type.as_str()) {
                types.push(step.tool_type.as_str());
            }
        }
        types
    }
}
