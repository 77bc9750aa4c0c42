//! Job state machine.

use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Length of a generated job id, in hex characters.
pub const JOB_ID_LEN: usize = 8;

/// Short hex identifier of a job, typed by users on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random id. Uniqueness against issued ids is enforced
    /// by the registry.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex[..JOB_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// State of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Job is created but its task has not started yet.
    Pending,
    /// Job task is executing steps.
    Running,
    /// All steps finished successfully.
    Completed,
    /// A step failed or the task faulted.
    Failed,
    /// The task observed a cancellation request.
    Cancelled,
}

impl JobState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, target),
            (Pending, Running) | (Running, Completed) | (Running, Failed) | (Running, Cancelled)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the job is active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// One line of a job's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl LogEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.timestamp.with_timezone(&Local);
        write!(f, "[{}] {}", local.format("%H:%M:%S"), self.text)
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: JobState,
    pub to: JobState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// One execution attempt of a workflow.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub workflow_name: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub logs: Vec<LogEntry>,
    /// Failure reason. Set exactly when `state` is `Failed`.
    pub error: Option<String>,
    pub transitions: Vec<StateTransition>,
    cancel: CancellationToken,
}

impl Job {
    /// Create a pending job bound to `cancel`.
    pub fn new(id: JobId, workflow_name: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            id,
            workflow_name: workflow_name.into(),
            state: JobState::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            logs: Vec::new(),
            error: None,
            transitions: Vec::new(),
            cancel,
        }
    }

    /// Token the job's task polls to learn that a stop was requested.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Transition to a new state.
    ///
    /// For `Failed`, the reason becomes the job's `error`.
    pub fn transition_to(
        &mut self,
        new_state: JobState,
        reason: Option<String>,
    ) -> Result<(), String> {
        if !self.state.can_transition_to(new_state) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            ));
        }

        if new_state == JobState::Failed {
            self.error = Some(
                reason
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            );
        }

        self.transitions.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: Utc::now(),
            reason,
        });
        self.state = new_state;

        match new_state {
            JobState::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.finished_at = Some(Utc::now()),
            _ => {}
        }

        Ok(())
    }

    /// Append a log line. Returns false (and drops the line) once the job is
    /// terminal.
    pub fn append_log(&mut self, text: impl Into<String>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.logs.push(LogEntry::new(text));
        true
    }

    /// Time shown in listings: when the job started running, or when it was
    /// created if it never ran.
    pub fn display_started_at(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or(self.created_at)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            workflow_name: self.workflow_name.clone(),
            state: self.state,
            started_at: self.display_started_at(),
            finished_at: self.finished_at,
            error: self.error.clone(),
        }
    }
}

/// Point-in-time copy of a job's summary fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub workflow_name: String,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(JobId::from("0badcafe"), "demo", CancellationToken::new())
    }

    #[test]
    fn state_transitions_valid() {
        assert!(JobState::Pending.can_transition_to(JobState::Running));
        assert!(JobState::Running.can_transition_to(JobState::Completed));
        assert!(JobState::Running.can_transition_to(JobState::Failed));
        assert!(JobState::Running.can_transition_to(JobState::Cancelled));
    }

    #[test]
    fn state_transitions_invalid() {
        assert!(!JobState::Pending.can_transition_to(JobState::Completed));
        assert!(!JobState::Pending.can_transition_to(JobState::Cancelled));
        assert!(!JobState::Running.can_transition_to(JobState::Pending));
        for terminal in [JobState::Completed, JobState::Failed, JobState::Cancelled] {
            for target in [
                JobState::Pending,
                JobState::Running,
                JobState::Completed,
                JobState::Failed,
                JobState::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Pending.is_terminal());
    }

    #[test]
    fn job_transitions_set_timestamps() {
        let mut job = job();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.started_at.is_none());

        job.transition_to(JobState::Running, None).unwrap();
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_none());

        job.transition_to(JobState::Completed, None).unwrap();
        assert!(job.finished_at.is_some());
        assert!(job.error.is_none());
        assert_eq!(job.transitions.len(), 2);
    }

    #[test]
    fn failed_transition_records_error() {
        let mut job = job();
        job.transition_to(JobState::Running, None).unwrap();
        job.transition_to(JobState::Failed, Some("step 2: boom".into()))
            .unwrap();
        assert_eq!(job.error.as_deref(), Some("step 2: boom"));
    }

    #[test]
    fn no_transition_out_of_terminal() {
        let mut job = job();
        job.transition_to(JobState::Running, None).unwrap();
        job.transition_to(JobState::Cancelled, None).unwrap();
        assert!(job.transition_to(JobState::Failed, Some("late".into())).is_err());
        assert_eq!(job.state, JobState::Cancelled);
        assert!(job.error.is_none());
    }

    #[test]
    fn logs_frozen_after_terminal() {
        let mut job = job();
        job.transition_to(JobState::Running, None).unwrap();
        assert!(job.append_log("one"));
        job.transition_to(JobState::Completed, None).unwrap();
        assert!(!job.append_log("two"));
        assert_eq!(job.logs.len(), 1);
        assert_eq!(job.logs[0].text, "one");
    }

    #[test]
    fn generated_ids_are_short_hex() {
        let id = JobId::generate();
        assert_eq!(id.as_str().len(), JOB_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn log_entry_display_format() {
        let line = LogEntry::new("Step 1: a").to_string();
        assert!(line.starts_with('['));
        assert_eq!(&line[9..], "] Step 1: a");
    }

    #[test]
    fn job_state_display_and_serde() {
        assert_eq!(JobState::Running.to_string(), "RUNNING");
        let json = serde_json::to_string(&JobState::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
    }
}
