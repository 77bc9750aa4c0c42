//! Per-job task body.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{ExecutorError, JobError};
use crate::executor::{ExecutorFactory, Outcome};
use crate::worker::registry::JobRegistry;
use crate::worker::sink::LogSink;
use crate::worker::state::{JobId, JobState};

/// Shared dependencies for worker execution.
#[derive(Clone)]
pub struct WorkerDeps {
    pub registry: Arc<JobRegistry>,
    pub executors: Arc<dyn ExecutorFactory>,
}

/// Drives one job from PENDING to a terminal state.
pub struct Worker {
    job_id: JobId,
    workflow_name: String,
    steps: Vec<String>,
    cancel: CancellationToken,
    deps: WorkerDeps,
}

impl Worker {
    pub fn new(
        job_id: JobId,
        workflow_name: impl Into<String>,
        steps: Vec<String>,
        cancel: CancellationToken,
        deps: WorkerDeps,
    ) -> Self {
        Self {
            job_id,
            workflow_name: workflow_name.into(),
            steps,
            cancel,
            deps,
        }
    }

    /// Run the job. Never fails and never panics: errors and panics inside
    /// the job end up as a FAILED job.
    pub async fn run(self) {
        let job_id = self.job_id.clone();
        let registry = Arc::clone(&self.deps.registry);

        let fault = match AssertUnwindSafe(self.execute()).catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("task panicked: {}", panic_message(panic.as_ref())),
        };

        record_fault(&registry, &job_id, &fault).await;
    }

    async fn execute(self) -> Result<(), JobError> {
        let registry = &self.deps.registry;
        let sink = LogSink::new(Arc::clone(registry), self.job_id.clone());

        registry
            .transition(&self.job_id, JobState::Running, Some("task started".into()))
            .await?;
        tracing::info!(
            job_id = %self.job_id,
            workflow = %self.workflow_name,
            steps = self.steps.len(),
            "Job running"
        );
        sink.log("Initializing agent...").await;

        let mut executor = self.deps.executors.create(&self.job_id, &self.workflow_name);

        let outcome = if self.cancel.is_cancelled() {
            Outcome::Cancelled
        } else {
            match executor.prepare(&sink).await {
                Ok(()) => executor.run(&self.steps, &sink, &self.cancel).await,
                Err(ExecutorError::Cancelled) => Outcome::Cancelled,
                Err(e) => {
                    sink.log(format!("Agent setup failed: {e}")).await;
                    Outcome::Failure(format!("executor setup failed: {e}"))
                }
            }
        };

        self.finish(&sink, outcome).await
    }

    async fn finish(&self, sink: &LogSink, outcome: Outcome) -> Result<(), JobError> {
        let registry = &self.deps.registry;
        match outcome {
            Outcome::Success => {
                sink.log("Workflow completed successfully.").await;
                registry
                    .transition(&self.job_id, JobState::Completed, None)
                    .await?;
                tracing::info!(job_id = %self.job_id, "Job completed");
            }
            Outcome::Failure(reason) => {
                sink.log(format!("Critical failure: {reason}")).await;
                tracing::warn!(job_id = %self.job_id, "Job failed: {}", reason);
                registry
                    .transition(&self.job_id, JobState::Failed, Some(reason))
                    .await?;
            }
            Outcome::Cancelled => {
                sink.log("Job was cancelled by user.").await;
                registry
                    .transition(
                        &self.job_id,
                        JobState::Cancelled,
                        Some("cancellation requested".into()),
                    )
                    .await?;
                tracing::info!(job_id = %self.job_id, "Job cancelled");
            }
        }
        Ok(())
    }
}

/// Move a faulted job to FAILED, whatever non-terminal state it is in.
pub(crate) async fn record_fault(registry: &JobRegistry, job_id: &JobId, fault: &str) {
    let reason = format!("internal fault: {fault}");
    tracing::error!(job_id = %job_id, "{}", reason);

    let result = registry
        .update(job_id, |job| {
            if job.state.is_terminal() {
                return;
            }
            if job.state == JobState::Pending {
                let _ = job.transition_to(JobState::Running, Some("fault recovery".into()));
            }
            job.append_log(format!("Critical failure: {reason}"));
            let _ = job.transition_to(JobState::Failed, Some(reason));
        })
        .await;

    if let Err(e) = result {
        tracing::error!(job_id = %job_id, "Could not record job fault: {}", e);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
