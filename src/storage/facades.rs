//! User-facing storage facades.
//!
//! - `StorageWriter`: appends that resolve once committed
//! - `ObservationReader`: range queries and per-source summaries
//! - `StorageAdmin`: pruning, checkpoints and shutdown

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tokio::sync::{mpsc, oneshot};

use crate::storage::StorageError;
use crate::storage::actor::Command;
use crate::storage::stream::{ObservationStream, SourceSelector, observation_stream};
use crate::storage::types::{Observation, SourceSummary, from_micros};

// =============================================================================
// Writer
// =============================================================================

/// Storage writer.
///
/// Cloneable handle to the writer actor. Appends wait for channel capacity
/// (backpressure) and then for the transaction commit.
#[derive(Clone)]
pub struct StorageWriter {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for StorageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageWriter").finish_non_exhaustive()
    }
}

impl StorageWriter {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Durably append one observation and return its row id.
    ///
    /// Resolves only after the row is committed. Returns
    /// [`StorageError::Write`] when the transaction failed and
    /// [`StorageError::ChannelSend`] once storage has been shut down.
    pub async fn append(&self, observation: Observation) -> Result<i64, StorageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Append(observation, reply))
            .await
            .map_err(|_| StorageError::ChannelSend)?;
        rx.await.map_err(|_| StorageError::ChannelClosed)?
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Observation reader backed by the read-only connection pool.
#[derive(Clone)]
pub struct ObservationReader {
    pool: SqlitePool,
}

impl std::fmt::Debug for ObservationReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationReader").finish_non_exhaustive()
    }
}

impl ObservationReader {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stream observations matching `selector` with `start <= collected_at <= end`,
    /// ascending by `collected_at`.
    ///
    /// Nothing is read until the stream is polled. An inverted range yields
    /// an empty stream.
    pub fn query(
        &self,
        selector: SourceSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ObservationStream {
        observation_stream(
            self.pool.clone(),
            selector,
            start.timestamp_micros(),
            end.timestamp_micros(),
        )
    }

    /// Per-source counts and time bounds, ordered by source name.
    pub async fn sources(&self) -> Result<Vec<SourceSummary>, StorageError> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS count, MIN(collected_at) AS first_at, MAX(collected_at) AS last_at
             FROM observations GROUP BY source ORDER BY source",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<SourceSummary, StorageError> {
                Ok(SourceSummary {
                    source: row.try_get("source")?,
                    count: row.try_get("count")?,
                    first_at: from_micros(row.try_get("first_at")?)?,
                    last_at: from_micros(row.try_get("last_at")?)?,
                })
            })
            .collect()
    }

    /// Cheap round trip used by readiness checks.
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1 FROM observations LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Admin
// =============================================================================

/// Storage administration.
#[derive(Clone)]
pub struct StorageAdmin {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for StorageAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdmin").finish_non_exhaustive()
    }
}

impl StorageAdmin {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Delete observations collected before `cutoff`. Returns the number removed.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Prune(cutoff, reply))
            .await
            .map_err(|_| StorageError::ChannelSend)?;
        rx.await.map_err(|_| StorageError::ChannelClosed)?
    }

    /// Force a WAL checkpoint.
    pub async fn checkpoint(&self) -> Result<(), StorageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Checkpoint(reply))
            .await
            .map_err(|_| StorageError::ChannelSend)?;
        rx.await.map_err(|_| StorageError::ChannelClosed)?
    }

    pub(crate) async fn request_shutdown(&self) -> Result<(), StorageError> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| StorageError::ChannelSend)
    }
}
