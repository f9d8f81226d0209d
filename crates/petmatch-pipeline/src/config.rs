//! Pipeline configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use petmatch_core::{defaults, env_or, Error, MatchPolicy, Result};

/// When post-commit tasks run relative to the ingestion response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// Run every task before responding; the response reflects the outcome.
    #[default]
    Inline,
    /// Respond right after the record write; tasks run on a spawned task.
    Background,
}

impl FromStr for TaskMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "background" => Ok(Self::Background),
            other => Err(Error::Config(format!(
                "INGEST_TASK_MODE must be inline or background, got {}",
                other
            ))),
        }
    }
}

/// Retry schedule for post-commit tasks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after every failure.
    pub initial_backoff: Duration,
    /// Deadline of a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::TASK_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(defaults::TASK_BACKOFF_MS),
            attempt_timeout: Duration::from_secs(defaults::WRITE_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Read `TASK_MAX_ATTEMPTS`, `TASK_BACKOFF_MS` and `INGEST_WRITE_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self {
            max_attempts: env_or("TASK_MAX_ATTEMPTS", defaults::TASK_MAX_ATTEMPTS).max(1),
            initial_backoff: Duration::from_millis(env_or(
                "TASK_BACKOFF_MS",
                defaults::TASK_BACKOFF_MS,
            )),
            attempt_timeout: Duration::from_secs(env_or(
                "INGEST_WRITE_TIMEOUT_SECS",
                defaults::WRITE_TIMEOUT_SECS,
            )),
        }
    }

    /// A single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }
}

/// Deadlines and limits of the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub upload_timeout: Duration,
    pub write_timeout: Duration,
    pub embed_timeout: Duration,
    pub index_timeout: Duration,
    pub max_images: usize,
    /// Prefix of generated storage keys.
    pub key_prefix: String,
    pub task_mode: TaskMode,
    pub retry: RetryPolicy,
    /// Raw similarity needed before an owner is notified.
    pub notify_threshold: f32,
    /// Maximum lost records considered per notification pass.
    pub notify_limit: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_timeout: Duration::from_secs(defaults::UPLOAD_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(defaults::WRITE_TIMEOUT_SECS),
            embed_timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
            index_timeout: Duration::from_secs(defaults::INDEX_QUERY_TIMEOUT_SECS),
            max_images: defaults::MAX_IMAGES_PER_SUBMISSION,
            key_prefix: defaults::IMAGE_KEY_PREFIX.to_string(),
            task_mode: TaskMode::default(),
            retry: RetryPolicy::default(),
            notify_threshold: defaults::NOTIFY_THRESHOLD,
            notify_limit: defaults::CANDIDATE_LIMIT,
        }
    }
}

impl PipelineConfig {
    /// Load from the environment. The notification threshold comes from the
    /// matching policy so search and notification agree.
    pub fn from_env(policy: &MatchPolicy) -> Result<Self> {
        let task_mode = match std::env::var("INGEST_TASK_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => TaskMode::default(),
        };
        Ok(Self {
            upload_timeout: Duration::from_secs(env_or(
                "INGEST_UPLOAD_TIMEOUT_SECS",
                defaults::UPLOAD_TIMEOUT_SECS,
            )),
            write_timeout: Duration::from_secs(env_or(
                "INGEST_WRITE_TIMEOUT_SECS",
                defaults::WRITE_TIMEOUT_SECS,
            )),
            embed_timeout: Duration::from_secs(env_or(
                "EMBED_TIMEOUT_SECS",
                defaults::EMBED_TIMEOUT_SECS,
            )),
            index_timeout: Duration::from_secs(env_or(
                "INDEX_QUERY_TIMEOUT_SECS",
                defaults::INDEX_QUERY_TIMEOUT_SECS,
            )),
            max_images: env_or("INGEST_MAX_IMAGES", defaults::MAX_IMAGES_PER_SUBMISSION).max(1),
            key_prefix: defaults::IMAGE_KEY_PREFIX.to_string(),
            task_mode,
            retry: RetryPolicy::from_env(),
            notify_threshold: policy.notify_threshold,
            notify_limit: policy.candidate_limit,
        })
    }

    pub fn with_task_mode(mut self, mode: TaskMode) -> Self {
        self.task_mode = mode;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn with_index_timeout(mut self, timeout: Duration) -> Self {
        self.index_timeout = timeout;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn with_notify_threshold(mut self, threshold: f32) -> Self {
        self.notify_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_mode_parse() {
        assert_eq!("inline".parse::<TaskMode>().unwrap(), TaskMode::Inline);
        assert_eq!(
            "Background".parse::<TaskMode>().unwrap(),
            TaskMode::Background
        );
        assert!(matches!(
            "later".parse::<TaskMode>().unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryPolicy {
            initial_backoff: Duration::from_millis(200),
            ..RetryPolicy::default()
        };
        assert_eq!(retry.backoff_for(1), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(400));
        assert_eq!(retry.backoff_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.task_mode, TaskMode::Inline);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.embed_timeout, Duration::from_secs(10));
        assert_eq!(config.notify_threshold, 0.85);
        assert_eq!(config.key_prefix, "pets");
    }
}
