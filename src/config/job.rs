//! Sampling job configuration.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::CollectorSpec;

use super::validation::ConfigError;

/// Default job interval (30 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Default collection timeout (5 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_enabled() -> bool {
    true
}

/// One configured sampling job.
///
/// ```yaml
/// - name: local.redis
///   interval: 10s
///   timeout: 2s
///   collector:
///     kind: tcp
///     host: 127.0.0.1
///     port: 6379
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name, used as the observation source.
    pub name: String,

    /// Cadence (default: 30s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Collection timeout (default: 5s, must not exceed the interval).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Disabled jobs are parsed and validated but never scheduled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Collection function.
    pub collector: CollectorSpec,
}

impl JobConfig {
    pub fn new(name: impl Into<String>, collector: CollectorSpec) -> Self {
        Self {
            name: name.into(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            enabled: true,
            collector,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| ConfigError::ValidationError(format!("job '{}': {msg}", self.name));

        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "job name cannot be empty".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(invalid("interval must be positive".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be positive".to_string()));
        }
        if self.timeout > self.interval {
            return Err(invalid(format!(
                "timeout {:?} exceeds interval {:?}",
                self.timeout, self.interval
            )));
        }
        self.collector.validate().map_err(invalid)
    }
}

/// Validate every job and reject duplicate names.
pub(crate) fn validate_jobs(jobs: &[JobConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for job in jobs {
        job.validate()?;
        if !seen.insert(job.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate job name: '{}'",
                job.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CommandConfig, TcpConfig};

    fn tcp_job(name: &str) -> JobConfig {
        JobConfig::new(name, CollectorSpec::Tcp(TcpConfig::new("127.0.0.1", 6379)))
    }

    #[test]
    fn test_job_defaults_from_yaml() {
        let job: JobConfig = serde_yaml::from_str(
            "name: load\ncollector:\n  kind: command\n  program: uptime\n",
        )
        .unwrap();
        assert_eq!(job.interval, DEFAULT_INTERVAL);
        assert_eq!(job.timeout, DEFAULT_TIMEOUT);
        assert!(job.enabled);
        assert_eq!(
            job.collector,
            CollectorSpec::Command(CommandConfig::new("uptime", Vec::<String>::new()))
        );
    }

    #[test]
    fn test_job_durations_from_yaml() {
        let job: JobConfig = serde_yaml::from_str(
            "name: cpu\ninterval: 1s\ntimeout: 500ms\nenabled: false\ncollector: {kind: tcp, host: db, port: 5432}\n",
        )
        .unwrap();
        assert_eq!(job.interval, Duration::from_secs(1));
        assert_eq!(job.timeout, Duration::from_millis(500));
        assert!(!job.enabled);
    }

    #[test]
    fn test_job_validation() {
        assert!(tcp_job("redis").validate().is_ok());
        assert!(tcp_job("").validate().is_err());
        assert!(
            tcp_job("redis")
                .with_interval(Duration::from_secs(1))
                .with_timeout(Duration::from_secs(2))
                .validate()
                .unwrap_err()
                .to_string()
                .contains("exceeds interval")
        );
        assert!(tcp_job("redis").with_timeout(Duration::ZERO).validate().is_err());

        let bad_collector =
            JobConfig::new("x", CollectorSpec::Tcp(TcpConfig::new("127.0.0.1", 0)));
        assert!(bad_collector.validate().unwrap_err().to_string().contains("job 'x'"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        assert!(validate_jobs(&[tcp_job("a"), tcp_job("b")]).is_ok());
        let err = validate_jobs(&[tcp_job("a"), tcp_job("a")]).unwrap_err();
        assert!(err.to_string().contains("duplicate job name"));
    }
}
