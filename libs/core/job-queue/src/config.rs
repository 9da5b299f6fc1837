//! Worker configuration

use core_config::{ConfigError, FromEnv, env_parse};

/// Configuration for the queue worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs processed at the same time
    pub concurrency: usize,

    /// Poll interval in milliseconds when no job is ready
    pub poll_interval_ms: u64,

    /// Upper bound for the pause after consecutive backing-store errors
    pub max_error_backoff_ms: u64,

    /// How often to sweep for jobs whose lease expired
    pub stalled_check_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            poll_interval_ms: 1000,
            max_error_backoff_ms: 30_000,
            stalled_check_interval_ms: 30_000,
        }
    }
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum concurrent jobs
    pub fn with_concurrency(mut self, count: usize) -> Self {
        self.concurrency = count.max(1);
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval_ms(mut self, interval: u64) -> Self {
        self.poll_interval_ms = interval.max(1);
        self
    }

    pub fn with_max_error_backoff_ms(mut self, backoff: u64) -> Self {
        self.max_error_backoff_ms = backoff;
        self
    }

    pub fn with_stalled_check_interval_ms(mut self, interval: u64) -> Self {
        self.stalled_check_interval_ms = interval.max(1);
        self
    }

    /// Pause after `consecutive_errors` backing-store failures in a row.
    pub fn error_backoff_ms(&self, consecutive_errors: u32) -> u64 {
        let exp = consecutive_errors.saturating_sub(1).min(16);
        (self.poll_interval_ms.saturating_mul(1 << exp)).min(self.max_error_backoff_ms)
    }
}

impl FromEnv for WorkerConfig {
    /// - QUEUE_CONCURRENCY: defaults to 1
    /// - QUEUE_POLL_INTERVAL_MS: defaults to 1000
    /// - QUEUE_MAX_ERROR_BACKOFF_MS: defaults to 30000
    /// - QUEUE_STALLED_CHECK_INTERVAL_MS: defaults to 30000
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self::new()
            .with_concurrency(env_parse("QUEUE_CONCURRENCY", defaults.concurrency)?)
            .with_poll_interval_ms(env_parse("QUEUE_POLL_INTERVAL_MS", defaults.poll_interval_ms)?)
            .with_max_error_backoff_ms(env_parse(
                "QUEUE_MAX_ERROR_BACKOFF_MS",
                defaults.max_error_backoff_ms,
            )?)
            .with_stalled_check_interval_ms(env_parse(
                "QUEUE_STALLED_CHECK_INTERVAL_MS",
                defaults.stalled_check_interval_ms,
            )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_clamps() {
        let config = WorkerConfig::new().with_concurrency(0).with_poll_interval_ms(0);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.poll_interval_ms, 1);
    }

    #[test]
    fn test_error_backoff_grows_and_caps() {
        let config = WorkerConfig::new()
            .with_poll_interval_ms(500)
            .with_max_error_backoff_ms(5_000);
        assert_eq!(config.error_backoff_ms(1), 500);
        assert_eq!(config.error_backoff_ms(2), 1_000);
        assert_eq!(config.error_backoff_ms(3), 2_000);
        assert_eq!(config.error_backoff_ms(10), 5_000);
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("QUEUE_CONCURRENCY", Some("4")),
                ("QUEUE_POLL_INTERVAL_MS", Some("250")),
                ("QUEUE_MAX_ERROR_BACKOFF_MS", None),
                ("QUEUE_STALLED_CHECK_INTERVAL_MS", Some("5000")),
            ],
            || {
                let config = WorkerConfig::from_env().unwrap();
                assert_eq!(config.concurrency, 4);
                assert_eq!(config.poll_interval_ms, 250);
                assert_eq!(config.max_error_backoff_ms, 30_000);
                assert_eq!(config.stalled_check_interval_ms, 5_000);
            },
        );
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        temp_env::with_var("QUEUE_CONCURRENCY", Some("lots"), || {
            let err = WorkerConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("QUEUE_CONCURRENCY"));
        });
    }
}
