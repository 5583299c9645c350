use std::path::Path;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use crate::config::TaskConfig;
use crate::models::{CoreError, CoreErrorKind, CoreResult, FileBinding, Task, ToolBinding};
use crate::registry::PluginRegistry;

/// Resolves every configured task against the registry.
///
/// Produces unscheduled tasks in configuration order; nothing is
/// instantiated. The first invalid task aborts binding.
pub fn bind_tasks(
    tasks: &IndexMap<String, TaskConfig>,
    registry: &PluginRegistry,
    run_dir: &Path,
) -> CoreResult<IndexMap<String, Task>> {
    if tasks.is_empty() {
        tracing::warn!("no tasks configured");
    }

    let mut bound = IndexMap::with_capacity(tasks.len());
    for (name, config) in tasks {
        let task = bind_task(name, config, registry, run_dir).map_err(|error| error.for_task(name))?;
        tracing::debug!(
            task = %name,
            path = %task.path.display(),
            tools = task.tools.len(),
            files = task.files.len(),
            "bound task"
        );
        bound.insert(name.clone(), task);
    }
    Ok(bound)
}

fn bind_task(
    name: &str,
    config: &TaskConfig,
    registry: &PluginRegistry,
    run_dir: &Path,
) -> CoreResult<Task> {
    let Some(path) = config.path.as_deref() else {
        return Err(missing(format!("tasks/{name}/path")));
    };
    let path = std::path::absolute(path)
        .map_err(|error| CoreError::io("failed to resolve task path", path, error))?;
    if !path.exists() {
        return Err(CoreError::new(
            CoreErrorKind::PathNotFound,
            format!("path '{}' for task {name} does not exist", path.display()),
        ));
    }

    let tools = match config.tools.as_ref() {
        Some(tools) if !tools.is_empty() => tools,
        _ => return Err(missing(format!("tasks/{name}/tools"))),
    };

    let mut tool_bindings = IndexMap::with_capacity(tools.len());
    for (tool_type, names) in tools {
        if !registry.has_tool_type(tool_type) {
            return Err(CoreError::new(
                CoreErrorKind::UnknownReference,
                format!("tool type '{tool_type}' for task {name} is not registered"),
            ));
        }

        let mut names = names.iter().flatten();
        let (Some((tool_name, params)), None) = (names.next(), names.next()) else {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("task {name} must configure exactly one {tool_type} tool"),
            ));
        };
        registry.tool(tool_type, tool_name)?;

        tool_bindings.insert(
            tool_type.clone(),
            ToolBinding {
                name: tool_name.clone(),
                params: params.clone().unwrap_or_default(),
            },
        );
    }

    let mut file_bindings = IndexMap::new();
    for (file_type, file) in config.files.iter().flatten() {
        registry.file(file_type)?;
        let Some(file_path) = file.path.as_deref() else {
            return Err(missing(format!("tasks/{name}/files/{file_type}/path")));
        };

        let configs = match &file.configs {
            None | Some(Value::Null) => Value::Mapping(Mapping::new()),
            Some(configs) => configs.clone(),
        };
        file_bindings.insert(
            file_type.clone(),
            FileBinding {
                path: path.join(file_path),
                configs,
                name: file.name.clone(),
            },
        );
    }

    Ok(Task {
        name: name.to_string(),
        output_dir: run_dir.join(name),
        path,
        tools: tool_bindings,
        files: file_bindings,
        order: None,
        steps: Vec::new(),
        cleanup: Vec::new(),
    })
}

fn missing(key: String) -> CoreError {
    CoreError::new(
        CoreErrorKind::MissingKey,
        format!("key \"{key}\" not found in configuration"),
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use indexmap::IndexMap;

    use super::bind_tasks;
    use crate::config::TaskConfig;
    use crate::models::{CoreErrorKind, CoreResult};
    use crate::registry::{PluginCatalog, PluginRegistry};
    use crate::tool::{Tool, ToolRuntime, ToolStep};

    struct Stub;

    impl Tool for Stub {
        fn create(_runtime: &ToolRuntime) -> CoreResult<Self> {
            Ok(Self)
        }

        fn steps() -> Vec<(&'static str, ToolStep<Self>)> {
            Vec::new()
        }
    }

    fn registry() -> PluginRegistry {
        let mut catalog = PluginCatalog::new();
        catalog
            .register_tool::<Stub>("build", "gcc")
            .register_tool::<Stub>("build", "clang");
        PluginRegistry::from_catalog(&catalog)
    }

    fn tasks(yaml: &str) -> IndexMap<String, TaskConfig> {
        let yaml = yaml.replace("{dir}", &std::env::temp_dir().display().to_string());
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn binds_tools_files_and_output_dir() {
        let tasks = tasks(
            "fw:\n  path: \"{dir}\"\n  tools:\n    build:\n      gcc:\n  files: {}\n",
        );
        let bound = bind_tasks(&tasks, &registry(), &PathBuf::from("/runs/1")).unwrap();

        let task = &bound["fw"];
        assert_eq!(task.output_dir, PathBuf::from("/runs/1/fw"));
        assert_eq!(task.tools["build"].name, "gcc");
        assert!(task.tools["build"].params.is_empty());
        assert!(task.order.is_none());
    }

    #[test]
    fn rejects_two_tools_of_one_type() {
        let tasks = tasks(
            "fw:\n  path: \"{dir}\"\n  tools:\n    build:\n      gcc:\n      clang:\n",
        );
        let error = bind_tasks(&tasks, &registry(), &PathBuf::from("/runs/1")).unwrap_err();

        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
        assert_eq!(error.task.as_deref(), Some("fw"));
    }

    #[test]
    fn reports_missing_and_unknown_references() {
        let error = bind_tasks(&tasks("fw:\n  tools:\n    build: { gcc: }\n"), &registry(), &PathBuf::new())
            .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::MissingKey);
        assert!(error.message.contains("tasks/fw/path"));

        let error = bind_tasks(&tasks("fw:\n  path: \"{dir}\"\n"), &registry(), &PathBuf::new())
            .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::MissingKey);

        let error = bind_tasks(
            &tasks("fw:\n  path: \"{dir}\"\n  tools:\n    flash: { jlink: }\n"),
            &registry(),
            &PathBuf::new(),
        )
        .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::UnknownReference);

        let error = bind_tasks(
            &tasks("fw:\n  path: \"{dir}\"\n  tools:\n    build: { msvc: }\n"),
            &registry(),
            &PathBuf::new(),
        )
        .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::UnknownReference);

        let error = bind_tasks(
            &tasks("fw:\n  path: \"{dir}\"\n  tools:\n    build: { gcc: }\n  files:\n    define: { path: a.h }\n"),
            &registry(),
            &PathBuf::new(),
        )
        .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::UnknownReference);
    }

    #[test]
    fn nonexistent_task_path_is_path_not_found() {
        let error = bind_tasks(
            &tasks("fw:\n  path: \"{dir}/testbench-no-such-dir\"\n  tools:\n    build: { gcc: }\n"),
            &registry(),
            &PathBuf::new(),
        )
        .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::PathNotFound);
    }
}
