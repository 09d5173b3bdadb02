//! Configuration module.
//!
//! YAML-based configuration loading and validation for:
//! - Server settings (bind address, port)
//! - Database settings (path, pool size, channel capacity, retention)
//! - Sampler settings (tick resolution)
//! - Sampling jobs (name, interval, timeout, collector)

mod app;
mod job;
mod validation;

pub use app::{AppConfig, DatabaseConfig, SamplerConfig, ServerConfig};
pub use job::{DEFAULT_INTERVAL, DEFAULT_TIMEOUT, JobConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
