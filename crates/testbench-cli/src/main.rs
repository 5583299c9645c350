use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use testbench_core::models::{StepStatus, TaskOutcome, TaskReport};
use testbench_core::plugins::register_builtins;
use testbench_core::testbench::{DEFAULT_ENV_FILE, DEFAULT_OUTPUT_DIR};
use testbench_core::{PluginCatalog, Testbench, TestbenchOptions};
use tracing_subscriber::EnvFilter;

/// Runs the tasks of a testbench configuration in schedule order.
#[derive(Parser, Debug)]
#[command(name = "testbench", version)]
struct Args {
    /// Testbench configuration (YAML).
    config: PathBuf,

    /// Base directory for run output.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    output: PathBuf,

    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Default subprocess timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(error) = init_tracing(&args.log_level) {
        eprintln!("invalid log level '{}': {error}", args.log_level);
        return ExitCode::from(2);
    }

    let mut catalog = PluginCatalog::new();
    register_builtins(&mut catalog);

    let options = TestbenchOptions {
        output_dir: args.output,
        env_file: args.env_file,
        command_timeout: args.timeout.filter(|seconds| *seconds > 0).map(Duration::from_secs),
    };

    let mut testbench = match Testbench::new(&args.config, options, &catalog) {
        Ok(testbench) => testbench,
        Err(error) => {
            tracing::error!(%error, "setup failed");
            eprintln!("error: {error}");
            return ExitCode::from(2);
        }
    };

    testbench.run_to_completion();
    if let Err(error) = testbench.write_report() {
        tracing::warn!(%error, "failed to write report");
    }

    print_summary(testbench.reports());
    println!("output: {}", testbench.output_dir().display());

    if testbench.reports().iter().all(TaskReport::succeeded) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn init_tracing(level: &str) -> Result<(), String> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(value) if !value.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(level).map_err(|error| error.to_string())?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn print_summary(reports: &[TaskReport]) {
    for report in reports {
        let outcome = match &report.outcome {
            TaskOutcome::Succeeded => "ok".to_string(),
            TaskOutcome::StepFailed => "step failed".to_string(),
            TaskOutcome::CleanupFailed => "cleanup failed".to_string(),
            TaskOutcome::InitFailed(message) => format!("init failed: {message}"),
            TaskOutcome::Panicked => "panicked".to_string(),
        };
        println!("[{}] {}: {outcome}", report.order, report.task);

        for step in &report.steps {
            let status = match &step.status {
                StepStatus::Succeeded => format!("ok ({:.2}s)", step.elapsed_secs),
                StepStatus::Failed(message) => format!("failed ({:.2}s): {message}", step.elapsed_secs),
                StepStatus::Skipped => "skipped".to_string(),
            };
            println!(
                "    {} ({}/{}): {status}",
                step.function, step.tool_type, step.tool_name
            );
        }
    }
}
