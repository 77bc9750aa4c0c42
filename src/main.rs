use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use flowrun::cli::Repl;
use flowrun::config::{ExecutorConfig, JobConfig, log_dir_from_env};
use flowrun::error::{self, ConfigError};
use flowrun::executor::LlmExecutorFactory;
use flowrun::llm::{LlmConfig, create_provider};
use flowrun::worker::JobManager;
use flowrun::workflow::WorkflowStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let llm_config = LlmConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        if let ConfigError::MissingEnvVar(var) = &e {
            eprintln!("  export {var}=...");
        }
        std::process::exit(1);
    });
    let manager = Arc::new(build_manager(&llm_config).context("startup failed")?);

    eprintln!("flowrun v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {:?}", llm_config.backend);
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Type 'help' for commands, 'exit' to quit.\n");

    let repl = Repl::new(
        Arc::clone(&manager),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    );
    let report = repl.run().await.context("terminal I/O failed")?;

    tracing::info!(
        stopped = report.stopped.len(),
        stuck = report.stuck.len(),
        "Shutdown complete"
    );
    Ok(())
}

/// Read the job and executor settings, connect the LLM backend and wire
/// them into a manager over the built-in workflows.
fn build_manager(llm_config: &LlmConfig) -> error::Result<JobManager> {
    let job_config = JobConfig::from_env()?;
    let executor_config = ExecutorConfig::from_env()?;
    let llm = create_provider(llm_config)?;

    let workflows = Arc::new(WorkflowStore::with_defaults());
    let executors = Arc::new(LlmExecutorFactory::new(llm, executor_config));
    Ok(JobManager::new(workflows, executors, job_config))
}

/// Log to stderr, or to a daily-rolling file when `FLOWRUN_LOG_DIR` is set.
/// The returned guard flushes the file writer on drop.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir_from_env() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "flowrun.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            None
        }
    }
}
