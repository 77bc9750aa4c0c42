//! Job manager: creates jobs, spawns their tasks, and routes queries,
//! cancellation and shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::JobConfig;
use crate::error::{Error, JobError};
use crate::executor::ExecutorFactory;
use crate::worker::registry::{JobRegistry, RegistrySummary};
use crate::worker::state::{JobId, JobSnapshot, JobState, LogEntry};
use crate::worker::worker::{Worker, WorkerDeps};
use crate::workflow::WorkflowStore;

/// How often `wait` re-checks a job's state.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long an aborted task gets to unwind before its job is marked stuck.
const ABORT_GRACE: Duration = Duration::from_millis(100);

/// Roughly 30 years, used when a timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, saturating to a far-future instant instead of overflowing.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Acknowledgement of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAck {
    /// The job's token was signalled by this call.
    Requested,
    /// The token had already been signalled; nothing changed.
    AlreadyRequested,
}

/// What `shutdown` managed to stop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Jobs whose tasks finished before the deadline.
    pub stopped: Vec<JobId>,
    /// Jobs whose tasks were still running at the deadline and were aborted.
    pub stuck: Vec<JobId>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.stuck.is_empty()
    }
}

/// Sole owner of the job registry and of every job task.
pub struct JobManager {
    registry: Arc<JobRegistry>,
    workflows: Arc<WorkflowStore>,
    executors: Arc<dyn ExecutorFactory>,
    config: JobConfig,
    /// Parent of every job's token; cancelled on shutdown.
    root: CancellationToken,
    /// Task handles of jobs that may still be running.
    tasks: Mutex<HashMap<JobId, JoinHandle<()>>>,
}

impl JobManager {
    pub fn new(
        workflows: Arc<WorkflowStore>,
        executors: Arc<dyn ExecutorFactory>,
        config: JobConfig,
    ) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            workflows,
            executors,
            config,
            root: CancellationToken::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn workflows(&self) -> &Arc<WorkflowStore> {
        &self.workflows
    }

    /// Start a job for `workflow_name` and return its id without waiting for
    /// it to run.
    pub async fn start(&self, workflow_name: &str) -> Result<JobId, Error> {
        let workflow = self.workflows.get(workflow_name).await?;

        // Held across the shutdown check and the insert so that shutdown
        // either rejects this start or sees its handle.
        let mut tasks = self.tasks.lock().await;
        if self.root.is_cancelled() {
            return Err(JobError::ShuttingDown.into());
        }
        tasks.retain(|_, handle| !handle.is_finished());

        let cancel = self.root.child_token();
        let job_id = self.registry.create(&workflow.name, cancel.clone()).await;
        let worker = Worker::new(
            job_id.clone(),
            workflow.name.clone(),
            workflow.steps,
            cancel,
            WorkerDeps {
                registry: Arc::clone(&self.registry),
                executors: Arc::clone(&self.executors),
            },
        );
        tasks.insert(job_id.clone(), tokio::spawn(worker.run()));

        tracing::info!(job_id = %job_id, workflow = %workflow.name, "Job started");
        Ok(job_id)
    }

    /// Snapshots of every job in creation order.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        self.registry.list().await
    }

    pub async fn get(&self, job_id: &JobId) -> Result<JobSnapshot, JobError> {
        self.registry.snapshot(job_id).await
    }

    /// Copy of a job's log as it is right now.
    pub async fn get_logs(&self, job_id: &JobId) -> Result<Vec<LogEntry>, JobError> {
        self.registry.logs(job_id).await
    }

    pub async fn summary(&self) -> RegistrySummary {
        self.registry.summary().await
    }

    /// Ask a job to stop at its next checkpoint.
    ///
    /// Does not change the job itself; its task observes the signal and
    /// moves to CANCELLED.
    pub async fn cancel(&self, job_id: &JobId) -> Result<CancelAck, JobError> {
        let ack = self
            .registry
            .update(job_id, |job| {
                if job.state.is_terminal() {
                    return Err(JobError::InvalidState {
                        id: job_id.clone(),
                        state: job.state,
                    });
                }
                let token = job.cancellation_token();
                if token.is_cancelled() {
                    Ok(CancelAck::AlreadyRequested)
                } else {
                    token.cancel();
                    Ok(CancelAck::Requested)
                }
            })
            .await??;

        match ack {
            CancelAck::Requested => tracing::info!(job_id = %job_id, "Cancellation requested"),
            CancelAck::AlreadyRequested => {
                tracing::debug!(job_id = %job_id, "Cancellation already requested")
            }
        }
        Ok(ack)
    }

    /// Wait until a job is terminal or `timeout` elapses, returning its
    /// latest snapshot either way.
    pub async fn wait(&self, job_id: &JobId, timeout: Duration) -> Result<JobSnapshot, JobError> {
        let deadline = deadline_after(timeout);
        loop {
            let snapshot = self.registry.snapshot(job_id).await?;
            if snapshot.state.is_terminal() || Instant::now() >= deadline {
                return Ok(snapshot);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Cancel every job and wait for their tasks, up to the configured
    /// shutdown timeout. Tasks still running at the deadline are aborted and
    /// their jobs marked FAILED.
    pub async fn shutdown(&self) -> ShutdownReport {
        let mut tasks = {
            let mut guard = self.tasks.lock().await;
            self.root.cancel();
            std::mem::take(&mut *guard)
        };

        let timeout = self.config.shutdown_timeout;
        let deadline = deadline_after(timeout);
        let active = self.registry.active_jobs().await.len();
        tracing::info!(
            tasks = tasks.len(),
            active,
            timeout_secs = timeout.as_secs_f64(),
            "Shutting down job manager"
        );

        let mut report = ShutdownReport::default();
        for snapshot in self.registry.list().await {
            let Some(mut handle) = tasks.remove(&snapshot.id) else {
                continue;
            };
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.stopped.push(snapshot.id),
                Ok(Err(e)) => {
                    tracing::error!(job_id = %snapshot.id, "Job task ended abnormally: {}", e);
                    report.stopped.push(snapshot.id);
                }
                Err(_) => {
                    handle.abort();
                    if tokio::time::timeout(ABORT_GRACE, &mut handle).await.is_err() {
                        tracing::warn!(job_id = %snapshot.id, "Aborted task has not unwound yet");
                    }
                    if self.mark_stuck(&snapshot.id, timeout).await {
                        report.stuck.push(snapshot.id);
                    } else {
                        report.stopped.push(snapshot.id);
                    }
                }
            }
        }

        if !report.is_clean() {
            tracing::warn!(stuck = ?report.stuck, "Some jobs did not stop before shutdown timeout");
        }
        report
    }

    /// Move a job whose task was aborted to FAILED. Returns false when the
    /// job had already reached a terminal state on its own.
    async fn mark_stuck(&self, job_id: &JobId, timeout: Duration) -> bool {
        let reason = format!("did not stop within {timeout:?} of shutdown");
        let result = self
            .registry
            .update(job_id, |job| {
                if job.state.is_terminal() {
                    return false;
                }
                if job.state == JobState::Pending {
                    let _ = job.transition_to(JobState::Running, Some("shutdown".into()));
                }
                job.append_log(format!("Task aborted: {reason}"));
                job.transition_to(JobState::Failed, Some(reason)).is_ok()
            })
            .await;
        match result {
            Ok(marked) => marked,
            Err(e) => {
                tracing::error!(job_id = %job_id, "Could not mark stuck job: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::{ExecutorError, WorkflowError};
    use crate::executor::StepExecutor;
    use crate::worker::sink::LogSink;

    struct Noop;

    #[async_trait]
    impl StepExecutor for Noop {
        fn name(&self) -> &str {
            "instant"
        }

        async fn execute(
            &mut self,
            _step: &str,
            _sink: &LogSink,
            _cancel: &CancellationToken,
        ) -> Result<String, ExecutorError> {
            Ok("ok".into())
        }
    }

    struct InstantFactory;

    impl ExecutorFactory for InstantFactory {
        fn create(&self, _job_id: &JobId, _workflow: &str) -> Box<dyn StepExecutor> {
            Box::new(Noop)
        }
    }

    async fn manager() -> JobManager {
        let store = Arc::new(WorkflowStore::new());
        store
            .add("demo", vec!["a".into(), "b".into()])
            .await
            .unwrap();
        JobManager::new(store, Arc::new(InstantFactory), JobConfig::default())
    }

    #[tokio::test]
    async fn start_unknown_workflow_leaves_registry_empty() {
        let manager = manager().await;
        let err = manager.start("missing").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Workflow(WorkflowError::NotFound { .. })
        ));
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn started_job_completes() {
        let manager = manager().await;
        let id = manager.start("demo").await.unwrap();

        let snapshot = manager.wait(&id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.workflow_name, "demo");
    }

    #[tokio::test]
    async fn cancel_terminal_job_is_invalid_state() {
        let manager = manager().await;
        let id = manager.start("demo").await.unwrap();
        manager.wait(&id, Duration::from_secs(5)).await.unwrap();

        let before = manager.get_logs(&id).await.unwrap();
        let err = manager.cancel(&id).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidState {
                state: JobState::Completed,
                ..
            }
        ));
        assert_eq!(manager.get_logs(&id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn huge_timeouts_do_not_overflow() {
        let store = Arc::new(WorkflowStore::new());
        store.add("demo", vec!["a".into()]).await.unwrap();
        let manager = JobManager::new(
            store,
            Arc::new(InstantFactory),
            JobConfig {
                shutdown_timeout: Duration::MAX,
            },
        );

        let id = manager.start("demo").await.unwrap();
        let snapshot = manager.wait(&id, Duration::MAX).await.unwrap();
        assert_eq!(snapshot.state, JobState::Completed);

        let report = manager.shutdown().await;
        assert_eq!(report.stopped, vec![id]);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn mark_stuck_leaves_finished_jobs_alone() {
        let manager = manager().await;
        let id = manager.start("demo").await.unwrap();
        manager.wait(&id, Duration::from_secs(5)).await.unwrap();
        let logs = manager.get_logs(&id).await.unwrap();

        assert!(!manager.mark_stuck(&id, Duration::from_secs(1)).await);
        assert_eq!(manager.get(&id).await.unwrap().state, JobState::Completed);
        assert_eq!(manager.get_logs(&id).await.unwrap(), logs);
    }

    #[tokio::test]
    async fn mark_stuck_fails_running_job() {
        let manager = manager().await;
        let id = manager
            .registry
            .create("demo", CancellationToken::new())
            .await;
        manager
            .registry
            .transition(&id, JobState::Running, None)
            .await
            .unwrap();

        assert!(manager.mark_stuck(&id, Duration::from_millis(100)).await);
        let snapshot = manager.get(&id).await.unwrap();
        assert_eq!(snapshot.state, JobState::Failed);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("did not stop within 100ms of shutdown")
        );
    }

    #[tokio::test]
    async fn start_after_shutdown_is_rejected() {
        let manager = manager().await;
        let report = manager.shutdown().await;
        assert!(report.is_clean());

        assert!(matches!(
            manager.start("demo").await,
            Err(Error::Job(JobError::ShuttingDown))
        ));
    }
}
