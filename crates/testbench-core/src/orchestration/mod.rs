pub mod binder;
pub mod schedule;
pub mod scheduler;
mod task_runner;

pub use binder::bind_tasks;
pub use schedule::{Schedule, build_schedule};
pub use scheduler::{Scheduler, SchedulerState};

use std::sync::Arc;
use std::time::Duration;

use crate::config::EnvSnapshot;
use crate::execution::ProcessExecutor;
use crate::registry::PluginRegistry;

/// Shared, read-only state every task of a run executes against.
#[derive(Clone)]
pub struct ExecutionContext {
    pub registry: Arc<PluginRegistry>,
    pub env: Arc<EnvSnapshot>,
    pub executor: Arc<dyn ProcessExecutor>,
    /// Runtime driving subprocess I/O. Task threads block on it, so it must
    /// not be a current-thread runtime owned by the calling thread.
    pub handle: tokio::runtime::Handle,
    pub command_timeout: Option<Duration>,
}
