//! Core data types for the storage layer.
//!
//! - [`Observation`]: one immutable, time-stamped measurement
//! - [`ObservationValue`]: numeric or structured payload
//! - [`SourceSummary`]: per-source aggregate used by the read API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// Measured value carried by an [`Observation`].
///
/// Serialized untagged: a number stays a JSON number, a structured payload
/// stays the JSON value it was collected as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    /// Scalar measurement (latency, gauge, counter).
    Number(f64),
    /// Arbitrary JSON document.
    Structured(serde_json::Value),
}

impl ObservationValue {
    /// Numeric value, if this is a scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Structured(_) => None,
        }
    }
}

impl From<f64> for ObservationValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<serde_json::Value> for ObservationValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Structured(v)
    }
}

/// A time-stamped measurement stored in the `observations` table.
///
/// Observations are never updated once appended. Timestamps are stored with
/// microsecond precision; duplicates and out-of-order timestamps are allowed.
///
/// # Example
///
/// ```
/// use cadence::{Observation, ObservationValue};
///
/// let obs = Observation::now("cpu", 42.0);
/// assert_eq!(obs.source, "cpu");
/// assert_eq!(obs.value, ObservationValue::Number(42.0));
/// assert!(obs.id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Row identifier assigned on append (`None` before it is stored).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<i64>,
    /// Collection time (UTC).
    pub collected_at: DateTime<Utc>,
    /// Name of the job that produced the value.
    pub source: String,
    /// Measured value.
    pub value: ObservationValue,
}

impl Observation {
    /// Create an observation with an explicit timestamp.
    pub fn new(
        source: impl Into<String>,
        collected_at: DateTime<Utc>,
        value: impl Into<ObservationValue>,
    ) -> Self {
        Self {
            id: None,
            collected_at,
            source: source.into(),
            value: value.into(),
        }
    }

    /// Create an observation stamped with the current time.
    pub fn now(source: impl Into<String>, value: impl Into<ObservationValue>) -> Self {
        Self::new(source, Utc::now(), value)
    }

    /// Split the value into its `(value_num, payload)` column pair.
    ///
    /// Non-finite numbers are rejected: SQLite would store NaN as NULL.
    pub(crate) fn columns(&self) -> Result<(Option<f64>, Option<String>), StorageError> {
        match &self.value {
            ObservationValue::Number(v) if !v.is_finite() => Err(StorageError::InvalidData(
                format!("non-finite value {v} for source '{}'", self.source),
            )),
            ObservationValue::Number(v) => Ok((Some(*v), None)),
            ObservationValue::Structured(doc) => Ok((None, Some(serde_json::to_string(doc)?))),
        }
    }
}

/// Aggregate over all stored observations of one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub count: i64,
    pub first_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
}

/// Convert stored microseconds back to a UTC timestamp.
pub(crate) fn from_micros(us: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_micros(us).ok_or_else(|| {
        StorageError::InvalidData(format!("timestamp out of range: {us}"))
    })
}
