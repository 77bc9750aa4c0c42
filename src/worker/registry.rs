//! Registry of every job created in this process.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::worker::state::{Job, JobId, JobSnapshot, JobState, LogEntry};

#[derive(Default)]
struct RegistryInner {
    jobs: HashMap<JobId, Job>,
    /// Ids in creation order.
    order: Vec<JobId>,
}

/// Owns all jobs. Entries are never removed, so an id is never issued twice.
///
/// A single lock guards the whole map; every read hands out an owned copy so
/// callers never observe a half-written log or state.
#[derive(Default)]
pub struct JobRegistry {
    inner: RwLock<RegistryInner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending job with a freshly generated id.
    pub async fn create(
        &self,
        workflow_name: impl Into<String>,
        cancel: CancellationToken,
    ) -> JobId {
        let mut inner = self.inner.write().await;
        let mut id = JobId::generate();
        while inner.jobs.contains_key(&id) {
            id = JobId::generate();
        }
        inner.order.push(id.clone());
        inner
            .jobs
            .insert(id.clone(), Job::new(id.clone(), workflow_name, cancel));
        id
    }

    /// Get a copy of a job.
    pub async fn get(&self, id: &JobId) -> Result<Job, JobError> {
        self.inner
            .read()
            .await
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound { id: id.clone() })
    }

    pub async fn snapshot(&self, id: &JobId) -> Result<JobSnapshot, JobError> {
        self.inner
            .read()
            .await
            .jobs
            .get(id)
            .map(Job::snapshot)
            .ok_or_else(|| JobError::NotFound { id: id.clone() })
    }

    /// Snapshots of all jobs in creation order.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).map(Job::snapshot))
            .collect()
    }

    pub async fn logs(&self, id: &JobId) -> Result<Vec<LogEntry>, JobError> {
        self.inner
            .read()
            .await
            .jobs
            .get(id)
            .map(|job| job.logs.clone())
            .ok_or_else(|| JobError::NotFound { id: id.clone() })
    }

    /// Run `f` against a job under the write lock.
    pub async fn update<F, R>(&self, id: &JobId, f: F) -> Result<R, JobError>
    where
        F: FnOnce(&mut Job) -> R,
    {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound { id: id.clone() })?;
        Ok(f(job))
    }

    /// Append a log line. Returns false when the job is already terminal.
    pub async fn append_log(&self, id: &JobId, text: impl Into<String>) -> Result<bool, JobError> {
        let text = text.into();
        let appended = self.update(id, |job| job.append_log(text)).await?;
        if !appended {
            tracing::debug!(job_id = %id, "Dropped log line for finished job");
        }
        Ok(appended)
    }

    /// Apply a state transition, mapping a rejected transition to an error.
    pub async fn transition(
        &self,
        id: &JobId,
        state: JobState,
        reason: Option<String>,
    ) -> Result<(), JobError> {
        self.update(id, |job| job.transition_to(state, reason))
            .await?
            .map_err(|reason| JobError::Internal {
                id: id.clone(),
                reason,
            })
    }

    /// Ids of jobs that have not reached a terminal state.
    pub async fn active_jobs(&self) -> Vec<JobId> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter(|id| inner.jobs.get(*id).is_some_and(|j| j.state.is_active()))
            .cloned()
            .collect()
    }

    /// Count jobs per state.
    pub async fn summary(&self) -> RegistrySummary {
        let inner = self.inner.read().await;

        let mut summary = RegistrySummary::default();
        for job in inner.jobs.values() {
            match job.state {
                JobState::Pending => summary.pending += 1,
                JobState::Running => summary.running += 1,
                JobState::Completed => summary.completed += 1,
                JobState::Failed => summary.failed += 1,
                JobState::Cancelled => summary.cancelled += 1,
            }
        }

        summary.total = inner.jobs.len();
        summary
    }
}

/// Summary of all jobs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}
