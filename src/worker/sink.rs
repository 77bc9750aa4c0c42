//! Log sink handed to step executors.

use std::sync::Arc;

use crate::worker::registry::JobRegistry;
use crate::worker::state::JobId;

/// Appends lines to one job's log.
#[derive(Clone)]
pub struct LogSink {
    registry: Arc<JobRegistry>,
    job_id: JobId,
}

impl LogSink {
    pub fn new(registry: Arc<JobRegistry>, job_id: JobId) -> Self {
        Self { registry, job_id }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Append a line. Lines for a finished job are dropped.
    pub async fn log(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!(job_id = %self.job_id, "{}", text);
        if let Err(e) = self.registry.append_log(&self.job_id, text).await {
            tracing::warn!(job_id = %self.job_id, "Failed to append job log: {}", e);
        }
    }
}
