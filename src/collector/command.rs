//! External command collector.
//!
//! Runs a program and parses its standard output: a bare number becomes a
//! numeric observation, anything else must be valid JSON.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::collector::{Collector, CollectorError};
use crate::storage::ObservationValue;

/// Configuration for a command collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to execute (looked up in `PATH`).
    pub program: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandConfig {
    /// Create a new command configuration.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.program.trim().is_empty() {
            return Err("program cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Command collector.
///
/// The child process is killed if the collection future is dropped, which
/// is what happens when the sampler abandons a job at its timeout.
#[derive(Debug)]
pub struct CommandCollector {
    config: CommandConfig,
}

impl CommandCollector {
    /// Create a new command collector.
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Collector for CommandCollector {
    fn kind(&self) -> &str {
        "command"
    }

    async fn collect(&self) -> Result<ObservationValue, CollectorError> {
        let output = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollectorError::Failed(format!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Interpret command output as a number or a JSON document.
fn parse_output(stdout: &str) -> Result<ObservationValue, CollectorError> {
    let text = stdout.trim();
    if text.is_empty() {
        return Err(CollectorError::Failed("command produced no output".to_string()));
    }
    if let Ok(v) = text.parse::<f64>()
        && v.is_finite()
    {
        return Ok(ObservationValue::Number(v));
    }
    serde_json::from_str(text)
        .map(ObservationValue::Structured)
        .map_err(|e| CollectorError::Failed(format!("unparsable output: {e}")))
}
