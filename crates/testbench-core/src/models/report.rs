use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Main,
    Cleanup,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "message")]
pub enum StepStatus {
    Succeeded,
    Failed(String),
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepReport {
    pub phase: StepPhase,
    pub tool_type: String,
    pub tool_name: String,
    pub function: String,
    pub status: StepStatus,
    pub elapsed_secs: f64,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "message")]
pub enum TaskOutcome {
    Succeeded,
    StepFailed,
    CleanupFailed,
    InitFailed(String),
    Panicked,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskReport {
    pub task: String,
    pub order: i64,
    pub outcome: TaskOutcome,
    pub steps: Vec<StepReport>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == TaskOutcome::Succeeded
    }

    pub fn step(&self, phase: StepPhase, function: &str) -> Option<&StepReport> {
        self.steps
            .iter()
            .find(|step| step.phase == phase && step.function == function)
    }
}
