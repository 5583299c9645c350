pub mod error;
pub mod plugin;
pub mod report;
pub mod task;

pub use error::{CoreError, CoreErrorKind, CoreResult, RequirementScope};
pub use plugin::{PluginCategory, PluginKey};
pub use report::{StepPhase, StepReport, StepStatus, TaskOutcome, TaskReport};
pub use task::{FileBinding, Step, Task, ToolBinding};
