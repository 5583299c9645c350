pub mod runtime;

pub use runtime::{Requirement, ToolRuntime};

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::models::{CoreError, CoreErrorKind, CoreResult};

/// A step entry point of tool plugin `T`.
pub type ToolStep<T> = fn(&mut T, &ToolRuntime) -> CoreResult<()>;

/// Contract every tool plugin implements.
///
/// `steps` is the plugin's complete dispatch table: a step name that is not
/// listed here can never be scheduled, and the table is checked when the
/// schedule is built, before any instance of the plugin exists.
pub trait Tool: Send + Sized + 'static {
    fn create(runtime: &ToolRuntime) -> CoreResult<Self>;

    fn steps() -> Vec<(&'static str, ToolStep<Self>)>;
}

pub(crate) type StepHandler =
    Arc<dyn Fn(&mut (dyn Any + Send), &ToolRuntime) -> CoreResult<()> + Send + Sync>;

pub(crate) type ToolFactory =
    Arc<dyn Fn(&ToolRuntime) -> CoreResult<Box<dyn Any + Send>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct StepTable {
    handlers: BTreeMap<String, StepHandler>,
}

impl StepTable {
    pub(crate) fn for_tool<T: Tool>() -> Self {
        let mut handlers = BTreeMap::new();
        for (name, step) in T::steps() {
            let handler: StepHandler = Arc::new(
                move |plugin: &mut (dyn Any + Send), runtime: &ToolRuntime| {
                    let tool = plugin.downcast_mut::<T>().ok_or_else(|| {
                        CoreError::new(
                            CoreErrorKind::Internal,
                            format!("step '{name}' invoked on a different tool implementation"),
                        )
                    })?;
                    step(tool, runtime)
                },
            );
            handlers.insert(name.to_string(), handler);
        }
        Self { handlers }
    }

    pub fn contains(&self, step: &str) -> bool {
        self.handlers.contains_key(step)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub(crate) fn handler(&self, step: &str) -> Option<&StepHandler> {
        self.handlers.get(step)
    }
}

impl Debug for StepTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

pub(crate) fn factory_for<T: Tool>() -> ToolFactory {
    Arc::new(|runtime: &ToolRuntime| {
        Ok(Box::new(T::create(runtime)?) as Box<dyn Any + Send>)
    })
}

/// A constructed tool plugin bound to its runtime for one task execution.
pub struct ToolInstance {
    runtime: ToolRuntime,
    plugin: Box<dyn Any + Send>,
    steps: StepTable,
}

impl ToolInstance {
    pub(crate) fn create(
        factory: &ToolFactory,
        steps: StepTable,
        runtime: ToolRuntime,
    ) -> CoreResult<Self> {
        let plugin = factory(&runtime)
            .map_err(|error| error.for_plugin(runtime.tool_type(), runtime.tool_name()))?;
        Ok(Self {
            runtime,
            plugin,
            steps,
        })
    }

    pub fn runtime(&self) -> &ToolRuntime {
        &self.runtime
    }

    /// Runs the step registered under `step`.
    pub fn run(&mut self, step: &str) -> CoreResult<()> {
        tracing::info!(
            task = self.runtime.task_name(),
            tool_type = self.runtime.tool_type(),
            tool_name = self.runtime.tool_name(),
            step,
            "running step"
        );
        let handler = self.steps.handler(step).cloned().ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::UnknownStep,
                format!(
                    "step '{step}' not found in tool {}/{} for {}",
                    self.runtime.tool_type(),
                    self.runtime.tool_name(),
                    self.runtime.task_name()
                ),
            )
            .for_task(self.runtime.task_name())
            .for_plugin(self.runtime.tool_type(), self.runtime.tool_name())
        })?;
        self.invoke(&handler)
    }

    pub(crate) fn invoke(&mut self, handler: &StepHandler) -> CoreResult<()> {
        handler(self.plugin.as_mut(), &self.runtime).map_err(|error| {
            error
                .for_task(self.runtime.task_name())
                .for_plugin(self.runtime.tool_type(), self.runtime.tool_name())
        })
    }
}
