use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::config::ScheduleEntry;
use crate::models::{CoreError, CoreErrorKind, CoreResult, Step, Task};
use crate::registry::PluginRegistry;

/// Tasks grouped by order; same-order tasks run together.
pub type Schedule = BTreeMap<i64, IndexMap<String, Task>>;

/// Assigns order, steps and cleanup to bound tasks and groups them by order.
///
/// Every step is resolved against the plugin's step table here, so a
/// misspelled function fails the run before anything executes.
pub fn build_schedule(
    mut tasks: IndexMap<String, Task>,
    entries: &IndexMap<String, ScheduleEntry>,
    registry: &PluginRegistry,
) -> CoreResult<Schedule> {
    if entries.is_empty() {
        tracing::warn!("schedule is empty");
    }

    let mut schedule = Schedule::new();
    for (name, entry) in entries {
        let Some(mut task) = tasks.shift_remove(name) else {
            return Err(CoreError::new(
                CoreErrorKind::UnknownReference,
                format!("scheduled task {name} is not configured"),
            ));
        };

        let order = entry
            .order
            .ok_or_else(|| missing(format!("schedule/{name}/order")).for_task(name))?;
        let Some(steps) = entry.steps.as_ref() else {
            return Err(missing(format!("schedule/{name}/steps")).for_task(name));
        };

        task.steps = resolve_steps(&task, steps, registry).map_err(|error| error.for_task(name))?;
        task.cleanup = match entry.cleanup.as_ref() {
            Some(cleanup) => {
                resolve_steps(&task, cleanup, registry).map_err(|error| error.for_task(name))?
            }
            None => Vec::new(),
        };
        task.order = Some(order);

        tracing::debug!(
            task = %name,
            order,
            steps = task.steps.len(),
            cleanup = task.cleanup.len(),
            "scheduled task"
        );
        schedule.entry(order).or_default().insert(name.clone(), task);
    }

    for name in tasks.keys() {
        tracing::warn!(task = %name, "task has no schedule entry and will not run");
    }

    Ok(schedule)
}

fn resolve_steps(
    task: &Task,
    entries: &IndexMap<String, String>,
    registry: &PluginRegistry,
) -> CoreResult<Vec<Step>> {
    entries
        .iter()
        .map(|(function, target)| resolve_step(task, function, target, registry))
        .collect()
}

fn resolve_step(
    task: &Task,
    function: &str,
    target: &str,
    registry: &PluginRegistry,
) -> CoreResult<Step> {
    let (tool_type, tool_name) = match target.split(';').collect::<Vec<_>>().as_slice() {
        [tool_type, tool_name] if !tool_type.trim().is_empty() && !tool_name.trim().is_empty() => {
            (tool_type.trim(), tool_name.trim())
        }
        _ => {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!(
                    "step {function} of task {} must be written as \"<tool type>;<tool name>\", got \"{target}\"",
                    task.name
                ),
            ));
        }
    };

    let unknown = |detail: String| {
        CoreError::new(
            CoreErrorKind::UnknownReference,
            format!(
                "step {function} of task {} uses {tool_type};{tool_name}: {detail}",
                task.name
            ),
        )
    };

    let Some(binding) = task.tools.get(tool_type) else {
        return Err(unknown(format!("tool type {tool_type} is not configured for the task")));
    };
    if binding.name != tool_name {
        return Err(unknown(format!(
            "the task configures {tool_type} tool {}",
            binding.name
        )));
    }

    let registration = registry
        .tool(tool_type, tool_name)
        .map_err(|error| unknown(error.message))?;
    let Some(handler) = registration.steps().handler(function) else {
        return Err(unknown(format!("function {function} not found")));
    };

    Ok(Step {
        tool_type: tool_type.to_string(),
        tool_name: tool_name.to_string(),
        function: function.to_string(),
        handler: handler.clone(),
    })
}

fn missing(key: String) -> CoreError {
    CoreError::new(
        CoreErrorKind::MissingKey,
        format!("key \"{key}\" not found in configuration"),
    )
}
