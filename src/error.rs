//! Error types for flowrun.

use std::time::Duration;

use crate::worker::state::{JobId, JobState};

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Context length exceeded: {used} tokens used, {limit} allowed")]
    ContextLengthExceeded { used: usize, limit: usize },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

impl LlmError {
    /// Whether a failed request is worth sending again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::RequestFailed { .. })
    }
}

/// Job-related errors returned synchronously to callers of the job manager.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: JobId },

    #[error("Job {id} is already {state}")]
    InvalidState { id: JobId, state: JobState },

    #[error("Job manager is shutting down")]
    ShuttingDown,

    #[error("Job {id} internal error: {reason}")]
    Internal { id: JobId, reason: String },
}

/// Workflow store errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow '{name}' not found")]
    NotFound { name: String },

    #[error("Workflow name must not be empty")]
    EmptyName,

    #[error("Workflow '{name}' has no steps")]
    EmptySteps { name: String },
}

/// Errors produced while executing a single step.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Step cancelled")]
    Cancelled,

    #[error("Step timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Result type alias for flowrun.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_error_display() {
        let id = JobId::from("deadbeef");
        assert_eq!(
            JobError::NotFound { id: id.clone() }.to_string(),
            "Job deadbeef not found"
        );
        assert_eq!(
            JobError::InvalidState {
                id,
                state: JobState::Completed
            }
            .to_string(),
            "Job deadbeef is already COMPLETED"
        );
    }

    #[test]
    fn retryable_llm_errors() {
        assert!(
            LlmError::RateLimited {
                provider: "openai".into(),
                retry_after: None
            }
            .is_retryable()
        );
        assert!(
            LlmError::RequestFailed {
                provider: "openai".into(),
                reason: "503".into()
            }
            .is_retryable()
        );
        assert!(
            !LlmError::AuthFailed {
                provider: "openai".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn startup_errors_convert_into_error() {
        let config: Error = ConfigError::InvalidValue {
            key: "FLOWRUN_STEP_TIMEOUT_SECS".into(),
            message: "must be greater than zero".into(),
        }
        .into();
        assert!(matches!(config, Error::Config(_)));
        assert_eq!(
            config.to_string(),
            "Configuration error: Invalid configuration value for \
             FLOWRUN_STEP_TIMEOUT_SECS: must be greater than zero"
        );

        let llm: Error = LlmError::AuthFailed {
            provider: "openai".into(),
        }
        .into();
        assert!(matches!(llm, Error::Llm(_)));
        assert_eq!(
            llm.to_string(),
            "LLM error: Authentication failed for provider openai"
        );
    }

    #[test]
    fn executor_error_from_llm() {
        let err: ExecutorError = LlmError::AuthFailed {
            provider: "anthropic".into(),
        }
        .into();
        assert!(matches!(err, ExecutorError::Llm(_)));
    }
}
