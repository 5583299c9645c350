use crate::models::CoreResult;
use crate::tool::{Tool, ToolRuntime, ToolStep};

/// Runs the shell command configured under the param named after each step.
#[derive(Debug, Default)]
pub struct ShellTool;

impl ShellTool {
    fn run_param(&mut self, runtime: &ToolRuntime, step: &str) -> CoreResult<()> {
        let command = runtime.ensure_param_str(step)?;
        runtime.run_command(command, step)
    }

    fn setup(&mut self, runtime: &ToolRuntime) -> CoreResult<()> {
        self.run_param(runtime, "setup")
    }

    fn build(&mut self, runtime: &ToolRuntime) -> CoreResult<()> {
        self.run_param(runtime, "build")
    }

    fn test(&mut self, runtime: &ToolRuntime) -> CoreResult<()> {
        self.run_param(runtime, "test")
    }

    fn run(&mut self, runtime: &ToolRuntime) -> CoreResult<()> {
        self.run_param(runtime, "run")
    }

    fn clean(&mut self, runtime: &ToolRuntime) -> CoreResult<()> {
        self.run_param(runtime, "clean")
    }
}

impl Tool for ShellTool {
    fn create(_runtime: &ToolRuntime) -> CoreResult<Self> {
        Ok(Self)
    }

    fn steps() -> Vec<(&'static str, ToolStep<Self>)> {
        vec![
            ("setup", Self::setup),
            ("build", Self::build),
            ("test", Self::test),
            ("run", Self::run),
            ("clean", Self::clean),
        ]
    }
}
