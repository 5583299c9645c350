use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;

use super::ExecutionContext;
use crate::file::{FileSpec, TaskFiles, restore_all};
use crate::models::{
    CoreError, CoreErrorKind, CoreResult, Step, StepPhase, StepReport, StepStatus, Task,
    TaskOutcome, TaskReport,
};
use crate::tool::{ToolInstance, ToolRuntime};

/// Runs one task start to finish: open its files, construct the tools its
/// steps use, run the main steps until the first failure, always run the
/// cleanup steps, then restore every file.
///
/// A panicking step counts as a failed step. Panics elsewhere unwind to the
/// scheduler.
pub(crate) fn run_task(task: &Task, order: i64, context: &ExecutionContext) -> TaskReport {
    let span = tracing::info_span!("task", task = %task.name, order);
    let _entered = span.enter();
    tracing::info!("starting task");

    let files = match open_files(task, context) {
        Ok(files) => Arc::new(files),
        Err(error) => return init_failed(task, order, error),
    };

    let mut tools = match instantiate_tools(task, &files, context) {
        Ok(tools) => tools,
        Err(error) => {
            restore_all(&files);
            return init_failed(task, order, error);
        }
    };

    let mut steps = Vec::with_capacity(task.steps.len() + task.cleanup.len());
    let mut failed = false;
    for step in &task.steps {
        if failed {
            steps.push(report(step, StepPhase::Main, StepStatus::Skipped, 0.0));
            continue;
        }
        let status = run_step(&mut tools, step, StepPhase::Main);
        failed = matches!(status.status, StepStatus::Failed(_));
        steps.push(status);
    }

    let mut cleanup_failed = false;
    for step in &task.cleanup {
        let status = run_step(&mut tools, step, StepPhase::Cleanup);
        cleanup_failed |= matches!(status.status, StepStatus::Failed(_));
        steps.push(status);
    }

    drop(tools);
    let restore_failures = restore_all(&files);
    if restore_failures > 0 {
        tracing::error!(failures = restore_failures, "files were not restored");
    }

    let outcome = if failed {
        TaskOutcome::StepFailed
    } else if cleanup_failed {
        TaskOutcome::CleanupFailed
    } else {
        TaskOutcome::Succeeded
    };
    tracing::info!(outcome = ?outcome, "finished task");

    TaskReport {
        task: task.name.clone(),
        order,
        outcome,
        steps,
    }
}

fn open_files(task: &Task, context: &ExecutionContext) -> CoreResult<TaskFiles> {
    let mut files = TaskFiles::with_capacity(task.files.len());
    for (file_type, binding) in &task.files {
        let spec = FileSpec {
            path: binding.path.clone(),
            configs: binding.configs.clone(),
            output_dir: task.output_dir.clone(),
            name: binding.name.clone(),
        };
        match context.registry.open_file(file_type, &spec) {
            Ok(session) => {
                files.insert(file_type.clone(), session);
            }
            Err(error) => {
                restore_all(&files);
                return Err(error.for_task(&task.name));
            }
        }
    }
    Ok(files)
}

/// Only tool types some step refers to are constructed.
fn instantiate_tools(
    task: &Task,
    files: &Arc<TaskFiles>,
    context: &ExecutionContext,
) -> CoreResult<IndexMap<String, ToolInstance>> {
    let mut tools = IndexMap::new();
    for tool_type in task.referenced_tool_types() {
        let Some(binding) = task.tools.get(tool_type) else {
            return Err(CoreError::new(
                CoreErrorKind::Internal,
                format!("task {} has steps for unconfigured tool type {tool_type}", task.name),
            )
            .for_task(&task.name));
        };
        let runtime = ToolRuntime::new(task, tool_type, binding, files.clone(), context)?;
        let instance = context.registry.instantiate_tool(runtime)?;
        tracing::debug!(tool_type, tool_name = %binding.name, "constructed tool");
        tools.insert(tool_type.to_string(), instance);
    }
    Ok(tools)
}

fn run_step(
    tools: &mut IndexMap<String, ToolInstance>,
    step: &Step,
    phase: StepPhase,
) -> StepReport {
    tracing::info!(
        step = %step.label(),
        tool_name = %step.tool_name,
        phase = ?phase,
        "running step"
    );

    let started = Instant::now();
    let result = match tools.get_mut(&step.tool_type) {
        Some(tool) => std::panic::catch_unwind(AssertUnwindSafe(|| tool.invoke(&step.handler)))
            .unwrap_or_else(|payload| {
                Err(CoreError::new(
                    CoreErrorKind::Internal,
                    format!("step panicked: {}", panic_message(payload.as_ref())),
                )
                .for_task(tool.runtime().task_name())
                .for_plugin(&step.tool_type, &step.tool_name))
            }),
        None => Err(CoreError::new(
            CoreErrorKind::Internal,
            format!("tool {} was not constructed", step.tool_type),
        )),
    };
    let elapsed_secs = started.elapsed().as_secs_f64();

    match result {
        Ok(()) => {
            tracing::info!(step = %step.label(), elapsed_secs, "step completed");
            report(step, phase, StepStatus::Succeeded, elapsed_secs)
        }
        Err(error) => {
            tracing::error!(
                step = %step.label(),
                elapsed_secs,
                error = %error,
                "step failed"
            );
            report(step, phase, StepStatus::Failed(error.to_string()), elapsed_secs)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn init_failed(task: &Task, order: i64, error: CoreError) -> TaskReport {
    tracing::error!(error = %error, "failed to initialize task");
    let steps = task
        .steps
        .iter()
        .map(|step| report(step, StepPhase::Main, StepStatus::Skipped, 0.0))
        .chain(
            task.cleanup
                .iter()
                .map(|step| report(step, StepPhase::Cleanup, StepStatus::Skipped, 0.0)),
        )
        .collect();
    TaskReport {
        task: task.name.clone(),
        order,
        outcome: TaskOutcome::InitFailed(error.to_string()),
        steps,
    }
}

fn report(step: &Step, phase: StepPhase, status: StepStatus, elapsed_secs: f64) -> StepReport {
    StepReport {
        phase,
        tool_type: step.tool_type.clone(),
        tool_name: step.tool_name.clone(),
        function: step.function.clone(),
        status,
        elapsed_secs,
    }
}
