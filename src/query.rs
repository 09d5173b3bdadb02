//! Query Façade
//!
//! Read-only access to stored observations for external callers. Inputs are
//! validated here so the storage layer only ever sees well-formed ranges
//! and selectors.

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use thiserror::Error;

use crate::storage::{
    Observation, ObservationReader, ObservationStream, SourceSelector, SourceSummary,
    StorageError,
};

/// Errors returned by [`QueryFacade`].
#[derive(Debug, Error)]
pub enum QueryError {
    /// Range end precedes its start.
    #[error("invalid time range: end {end} is before start {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Source name or prefix is empty or otherwise unusable.
    #[error("invalid source filter: {0}")]
    InvalidSource(String),

    /// A request parameter could not be parsed.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The store failed while serving the query.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl QueryError {
    /// Whether the caller supplied malformed input (as opposed to a store failure).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

/// Which sources a query matches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceFilter {
    /// Every source.
    #[default]
    Any,
    /// A single source by exact name.
    Exact(String),
    /// All sources whose name starts with the prefix (e.g. `web.`).
    Prefix(String),
}

impl SourceFilter {
    fn selector(&self) -> Result<SourceSelector, QueryError> {
        match self {
            Self::Any => Ok(SourceSelector::All),
            Self::Exact(name) if name.trim().is_empty() => Err(QueryError::InvalidSource(
                "source name cannot be empty".to_string(),
            )),
            Self::Prefix(prefix) if prefix.is_empty() => Err(QueryError::InvalidSource(
                "source prefix cannot be empty".to_string(),
            )),
            Self::Exact(name) => Ok(SourceSelector::Exact(name.clone())),
            Self::Prefix(prefix) => Ok(SourceSelector::Prefix(prefix.clone())),
        }
    }
}

/// Inclusive time range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window of length `span` ending now. A span reaching past the
    /// earliest representable time starts there instead.
    pub fn last(span: chrono::Duration) -> Self {
        let end = Utc::now();
        let start = end.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::new(start, end)
    }

    /// Whether `at` lies inside the range.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    fn validate(&self) -> Result<(), QueryError> {
        if self.end < self.start {
            return Err(QueryError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// Read-only query entry point.
#[derive(Debug, Clone)]
pub struct QueryFacade {
    reader: ObservationReader,
}

impl QueryFacade {
    pub fn new(reader: ObservationReader) -> Self {
        Self { reader }
    }

    /// Observations matching `filter` inside `range`, ordered by
    /// `collected_at` ascending.
    ///
    /// The stream is lazy and finite; rows appended after the call are not
    /// included. Malformed input fails before any storage access.
    pub fn get(&self, filter: &SourceFilter, range: TimeRange) -> Result<ObservationStream, QueryError> {
        range.validate()?;
        let selector = filter.selector()?;
        Ok(self.reader.query(selector, range.start, range.end))
    }

    /// Collect up to `limit` observations from [`get`](Self::get).
    pub async fn collect(
        &self,
        filter: &SourceFilter,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<Observation>, QueryError> {
        let observations = self
            .get(filter, range)?
            .take(limit)
            .try_collect()
            .await?;
        Ok(observations)
    }

    /// Per-source summary of everything stored.
    pub async fn sources(&self) -> Result<Vec<SourceSummary>, QueryError> {
        Ok(self.reader.sources().await?)
    }

    /// Check that the store is reachable.
    pub async fn ping(&self) -> Result<(), QueryError> {
        Ok(self.reader.ping().await?)
    }
}
