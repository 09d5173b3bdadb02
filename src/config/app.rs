//! Application configuration structures.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sampler::MIN_RESOLUTION;
use crate::storage::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_POOL_SIZE};

use super::job::{JobConfig, validate_jobs};
use super::validation::{ConfigError, expand_env_vars};

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/cadence.db")
}

// =============================================================================
// Server Configuration
// =============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "127.0.0.1").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Connection pool size for readers (default: 4).
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Writer command channel capacity (default: 1024).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Prune observations older than this; keep everything when unset.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub retention: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: DEFAULT_POOL_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            retention: None,
        }
    }
}

// =============================================================================
// Sampler Configuration
// =============================================================================

/// Sampler loop configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Base tick resolution; the GCD of job intervals when unset.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Duration>,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Sampler loop configuration.
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Sampling jobs.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file, expanding `${VAR:-default}`
    /// references first.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "database path cannot be empty".to_string(),
            ));
        }

        if self.database.pool_size == 0 {
            return Err(ConfigError::ValidationError(
                "database pool_size must be positive".to_string(),
            ));
        }

        if self.database.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "database channel_capacity must be positive".to_string(),
            ));
        }

        if let Some(retention) = self.database.retention
            && retention.is_zero()
        {
            return Err(ConfigError::ValidationError(
                "database retention must be positive".to_string(),
            ));
        }

        if let Some(resolution) = self.sampler.resolution
            && resolution < MIN_RESOLUTION
        {
            return Err(ConfigError::ValidationError(format!(
                "sampler resolution must be at least {MIN_RESOLUTION:?}"
            )));
        }

        validate_jobs(&self.jobs)
    }

    /// `bind:port` socket address string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorSpec, HttpConfig};

    const SAMPLE: &str = r#"
server:
  bind: 0.0.0.0
  port: 9000
database:
  path: ${CADENCE_TEST_APP_DB:-/var/lib/cadence/obs.db}
  retention: 30d
sampler:
  resolution: 500ms
jobs:
  - name: web.homepage
    interval: 1m
    timeout: 10s
    collector:
      kind: http
      url: https://example.com
      expected_status: 200
"#;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, PathBuf::from("data/cadence.db"));
        assert_eq!(config.database.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.database.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.database.retention.is_none());
        assert!(config.jobs.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.server_addr(), "0.0.0.0:9000");
        assert_eq!(config.database.path, PathBuf::from("/var/lib/cadence/obs.db"));
        assert_eq!(
            config.database.retention,
            Some(Duration::from_secs(30 * 86_400))
        );
        assert_eq!(config.sampler.resolution, Some(Duration::from_millis(500)));

        let job = &config.jobs[0];
        assert_eq!(job.name, "web.homepage");
        assert_eq!(job.interval, Duration::from_secs(60));
        assert_eq!(
            job.collector,
            CollectorSpec::Http(HttpConfig::new("https://example.com").with_expected_status(200))
        );
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.server.bind = "not-an-ip".to_string();
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("invalid server bind address")
        );

        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.sampler.resolution = Some(Duration::from_millis(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap().jobs.len(), 1);

        assert!(matches!(
            AppConfig::load(dir.path().join("missing.yaml")),
            Err(ConfigError::IoError(_))
        ));

        std::fs::write(&path, "jobs: [").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
