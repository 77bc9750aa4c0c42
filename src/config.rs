//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Largest timeout accepted anywhere, in seconds (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Default system instruction for the step executor agent.
pub const DEFAULT_INSTRUCTION: &str = "You are a background web automation agent.
Execute the steps provided faithfully.
If a step fails, report the error.";

/// Job manager configuration.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// How long `shutdown()` waits for running jobs before aborting them.
    pub shutdown_timeout: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl JobConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            shutdown_timeout: secs_var(
                &lookup,
                "FLOWRUN_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout,
            )?,
        })
    }
}

/// Step executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// System instruction given to the agent.
    pub instruction: String,
    /// Sampling temperature. Kept low for deterministic actions.
    pub temperature: f32,
    /// Reply length cap per step.
    pub max_tokens: u32,
    /// Upper bound on a single step.
    pub step_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            instruction: DEFAULT_INSTRUCTION.to_string(),
            temperature: 0.01,
            max_tokens: 4096,
            step_timeout: Duration::from_secs(120),
        }
    }
}

impl ExecutorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            instruction: lookup("FLOWRUN_INSTRUCTION")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.instruction),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            step_timeout: secs_var(&lookup, "FLOWRUN_STEP_TIMEOUT_SECS", defaults.step_timeout)?,
        })
    }
}

/// Directory for file logging, if enabled.
pub fn log_dir_from_env() -> Option<PathBuf> {
    std::env::var("FLOWRUN_LOG_DIR")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn secs_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a whole number of seconds, got '{raw}'"),
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            if secs > MAX_TIMEOUT_SECS {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be at most {MAX_TIMEOUT_SECS} seconds"),
                });
            }
            Ok(Duration::from_secs(secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let jobs = JobConfig::from_lookup(|_| None).unwrap();
        assert_eq!(jobs.shutdown_timeout, Duration::from_secs(10));

        let exec = ExecutorConfig::from_lookup(|_| None).unwrap();
        assert_eq!(exec.step_timeout, Duration::from_secs(120));
        assert_eq!(exec.instruction, DEFAULT_INSTRUCTION);
    }

    #[test]
    fn parses_overrides() {
        let jobs = JobConfig::from_lookup(|key| {
            (key == "FLOWRUN_SHUTDOWN_TIMEOUT_SECS").then(|| "3".to_string())
        })
        .unwrap();
        assert_eq!(jobs.shutdown_timeout, Duration::from_secs(3));

        let exec = ExecutorConfig::from_lookup(|key| match key {
            "FLOWRUN_STEP_TIMEOUT_SECS" => Some(" 30 ".to_string()),
            "FLOWRUN_INSTRUCTION" => Some("Be brief.".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(exec.step_timeout, Duration::from_secs(30));
        assert_eq!(exec.instruction, "Be brief.");
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = JobConfig::from_lookup(|_| Some("soon".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FLOWRUN_SHUTDOWN_TIMEOUT_SECS"));

        let err = ExecutorConfig::from_lookup(|key| {
            (key == "FLOWRUN_STEP_TIMEOUT_SECS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_timeouts_beyond_max() {
        let err = JobConfig::from_lookup(|key| {
            (key == "FLOWRUN_SHUTDOWN_TIMEOUT_SECS").then(|| u64::MAX.to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FLOWRUN_SHUTDOWN_TIMEOUT_SECS"));

        let ok = JobConfig::from_lookup(|key| {
            (key == "FLOWRUN_SHUTDOWN_TIMEOUT_SECS").then(|| MAX_TIMEOUT_SECS.to_string())
        })
        .unwrap();
        assert_eq!(ok.shutdown_timeout, Duration::from_secs(MAX_TIMEOUT_SECS));

        let err = ExecutorConfig::from_lookup(|key| {
            (key == "FLOWRUN_STEP_TIMEOUT_SECS").then(|| (MAX_TIMEOUT_SECS + 1).to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
