//! Config errors and the parsing helpers shared by the config and the API.

use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;

/// Errors from loading or checking a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("invalid YAML in config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A value parsed but is out of range or inconsistent.
    #[error("invalid config: {0}")]
    ValidationError(String),
}

/// Parse a positive duration such as `100ms`, `30s`, `15m` or `1h30m`.
///
/// ```
/// use cadence::config::parse_duration;
///
/// assert_eq!(parse_duration("15m").unwrap().as_secs(), 900);
/// assert_eq!(parse_duration("1h30m").unwrap().as_secs(), 5400);
/// assert!(parse_duration("0s").is_err());
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::ValidationError(format!("duration '{input}': {reason}"));

    match humantime::parse_duration(input.trim()) {
        Ok(duration) if duration.is_zero() => Err(invalid("must be greater than zero".into())),
        Ok(duration) => Ok(duration),
        Err(e) => Err(invalid(e.to_string())),
    }
}

/// Substitute `${NAME}` and `${NAME:-fallback}` with environment values.
/// A variable that is unset and has no fallback becomes an empty string.
pub fn expand_env_vars(input: &str) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

    let placeholder = PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("placeholder pattern is a valid regex")
    });

    placeholder
        .replace_all(input, |caps: &Captures| match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => caps.get(2).map_or_else(String::new, |m| m.as_str().to_owned()),
        })
        .into_owned()
}
