use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EnvSnapshot, TestbenchConfig, load_config};
use crate::execution::TokioProcessExecutor;
use crate::models::{CoreError, CoreErrorKind, CoreResult, PluginCategory, TaskReport};
use crate::orchestration::{ExecutionContext, Scheduler, bind_tasks, build_schedule};
use crate::output::{RunDirectory, local_offset};
use crate::registry::{PluginCatalog, PluginRegistry, discover};

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Clone, Debug, PartialEq)]
pub struct TestbenchOptions {
    /// Base directory; each run gets a timestamped subdirectory.
    pub output_dir: PathBuf,
    pub env_file: PathBuf,
    /// Overrides `settings.command_timeout` from the configuration.
    pub command_timeout: Option<Duration>,
}

impl Default for TestbenchOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            env_file: PathBuf::from(DEFAULT_ENV_FILE),
            command_timeout: None,
        }
    }
}

/// A fully validated run, ready to execute its schedule.
pub struct Testbench {
    config_path: PathBuf,
    run_dir: RunDirectory,
    scheduler: Scheduler,
    _runtime: tokio::runtime::Runtime,
}

impl Testbench {
    pub fn new(config_path: &Path, options: TestbenchOptions, catalog: &PluginCatalog) -> CoreResult<Self> {
        // Before the runtime spawns worker threads.
        local_offset();

        let loaded = load_config(config_path)?;
        tracing::info!(config = %loaded.path.display(), "loading testbench");

        let run_dir =
            RunDirectory::create(&options.output_dir).map_err(|error| error.in_phase("output directory"))?;
        run_dir
            .archive_config(&loaded.path, &loaded.includes)
            .and_then(|()| run_dir.write_resolved_config(&loaded.document))
            .map_err(|error| error.in_phase("output directory"))?;

        let mut document = loaded.document;
        let env = EnvSnapshot::load(&options.env_file)
            .and_then(|env| run_dir.write_env(&env).map(|()| env))
            .map_err(|error| error.in_phase("environment"))?;
        env.substitute(&mut document);
        tracing::debug!(variables = env.len(), "loaded environment");

        let config = TestbenchConfig::from_value(&document)?;

        let mut plugins = discover(&config.registry.tools, PluginCategory::Tool, catalog)
            .map_err(|error| error.in_phase("tools"))?;
        plugins.extend(
            discover(&config.registry.files, PluginCategory::File, catalog)
                .map_err(|error| error.in_phase("files"))?,
        );
        let registry = Arc::new(PluginRegistry::from_descriptors(plugins));

        let tasks = bind_tasks(&config.tasks, &registry, run_dir.path())
            .map_err(|error| error.in_phase("tasks"))?;
        let schedule = build_schedule(tasks, &config.schedule, &registry)
            .map_err(|error| error.in_phase("schedule"))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("failed to start async runtime: {error}"),
                )
            })?;

        let context = ExecutionContext {
            registry,
            env: Arc::new(env),
            executor: Arc::new(TokioProcessExecutor),
            handle: runtime.handle().clone(),
            command_timeout: options
                .command_timeout
                .or_else(|| config.settings.command_timeout()),
        };

        tracing::info!(
            output = %run_dir.path().display(),
            orders = schedule.len(),
            "initialized testbench"
        );

        Ok(Self {
            config_path: loaded.path,
            run_dir,
            scheduler: Scheduler::new(schedule, context),
            _runtime: runtime,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn output_dir(&self) -> &Path {
        self.run_dir.path()
    }

    pub fn iterate(&mut self) -> Option<i64> {
        self.scheduler.iterate()
    }

    pub fn is_done(&self) -> bool {
        self.scheduler.is_done()
    }

    pub fn run_to_completion(&mut self) -> &[TaskReport] {
        self.scheduler.run_to_completion()
    }

    pub fn reports(&self) -> &[TaskReport] {
        self.scheduler.reports()
    }

    /// Writes the reports collected so far to `report.json` in the run directory.
    pub fn write_report(&self) -> CoreResult<PathBuf> {
        self.run_dir.write_report(self.scheduler.reports())
    }
}
