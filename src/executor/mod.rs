//! Step executors: the backends that actually perform workflow steps.
//!
//! A job owns exactly one executor instance, created by an `ExecutorFactory`
//! when the job's task starts. Executors are cooperative: they receive the
//! job's cancellation token and should return promptly once it fires.

pub mod llm;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;
use crate::worker::sink::LogSink;
use crate::worker::state::JobId;

pub use llm::{LlmExecutorFactory, LlmStepExecutor};

/// How a run of steps ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
    Cancelled,
}

/// Performs workflow steps for a single job.
#[async_trait]
pub trait StepExecutor: Send {
    /// Name of this executor instance, for logs.
    fn name(&self) -> &str;

    /// One-time setup before the first step.
    async fn prepare(&mut self, _sink: &LogSink) -> Result<(), ExecutorError> {
        Ok(())
    }

    /// Perform one step and return its textual result.
    async fn execute(
        &mut self,
        step: &str,
        sink: &LogSink,
        cancel: &CancellationToken,
    ) -> Result<String, ExecutorError>;

    /// Run `steps` in order.
    ///
    /// The token is checked before every step; once it fires no further step
    /// starts. The first failing step ends the run.
    async fn run(
        &mut self,
        steps: &[String],
        sink: &LogSink,
        cancel: &CancellationToken,
    ) -> Outcome {
        sink.log(format!("Starting execution of {} steps.", steps.len()))
            .await;

        for (index, step) in steps.iter().enumerate() {
            let number = index + 1;
            if cancel.is_cancelled() {
                sink.log(format!(
                    "Cancellation observed before step {number}; remaining steps skipped."
                ))
                .await;
                return Outcome::Cancelled;
            }

            sink.log(format!("Step {number}: {step}")).await;
            match self.execute(step, sink, cancel).await {
                Ok(output) => sink.log(format!("Result: {output}")).await,
                Err(ExecutorError::Cancelled) => {
                    sink.log(format!("Step {number} interrupted by cancellation."))
                        .await;
                    return Outcome::Cancelled;
                }
                Err(e) => {
                    sink.log(format!("Error on step {number}: {e}")).await;
                    return Outcome::Failure(format!("step {number} failed: {e}"));
                }
            }
        }

        Outcome::Success
    }
}

/// Creates an isolated executor for each job.
pub trait ExecutorFactory: Send + Sync {
    fn create(&self, job_id: &JobId, workflow_name: &str) -> Box<dyn StepExecutor>;
}
