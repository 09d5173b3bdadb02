//! Writer actor with dedicated connection and MPSC channel.
//!
//! Single-writer pattern: one task owns the write connection and processes
//! commands received over a bounded channel. Appends are group-committed:
//! every append already queued when a transaction starts joins it (up to
//! [`DEFAULT_BATCH_SIZE`]), and each caller is answered once that
//! transaction has committed or failed.

use chrono::{DateTime, Utc};
use sqlx::{Connection, SqliteConnection};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::storage::StorageError;
use crate::storage::types::Observation;

// =============================================================================
// Constants
// =============================================================================

/// Maximum appends committed in one transaction.
pub const DEFAULT_BATCH_SIZE: usize = 500;

// =============================================================================
// Commands
// =============================================================================

/// Reply channel for a command.
pub type Reply<T> = oneshot::Sender<Result<T, StorageError>>;

/// Commands sent to the writer actor.
#[derive(Debug)]
pub enum Command {
    /// Append one observation; replies with its row id after commit.
    Append(Observation, Reply<i64>),
    /// Delete observations collected before the cutoff; replies with the row count.
    Prune(DateTime<Utc>, Reply<u64>),
    /// Force WAL checkpoint.
    Checkpoint(Reply<()>),
    /// Graceful shutdown. Commands queued before it are still processed.
    Shutdown,
}

/// A pending append waiting for its transaction.
type PendingAppend = (Observation, Reply<i64>);

/// An observation in column form, ready to insert.
struct Row {
    collected_at: i64,
    source: String,
    value_num: Option<f64>,
    payload: Option<String>,
}

impl Row {
    fn encode(obs: &Observation) -> Result<Self, StorageError> {
        let (value_num, payload) = obs.columns()?;
        Ok(Self {
            collected_at: obs.collected_at.timestamp_micros(),
            source: obs.source.clone(),
            value_num,
            payload,
        })
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Database writer actor.
pub struct DbActor {
    conn: SqliteConnection,
    rx: mpsc::Receiver<Command>,
    batch_size: usize,
}

impl DbActor {
    /// Spawn the writer actor on the current runtime.
    ///
    /// The connection must already carry the initialized schema.
    pub fn spawn(
        conn: SqliteConnection,
        channel_capacity: usize,
        batch_size: usize,
    ) -> (JoinHandle<()>, mpsc::Sender<Command>) {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let actor = DbActor {
            conn,
            rx,
            batch_size: batch_size.max(1),
        };
        let handle = tokio::spawn(actor.run());
        (handle, tx)
    }

    async fn run(mut self) {
        tracing::info!("DbActor started");

        // A non-append command pulled while draining a batch is handled right after it.
        let mut deferred: Option<Command> = None;

        loop {
            let cmd = match deferred.take() {
                Some(cmd) => cmd,
                None => match self.rx.recv().await {
                    Some(cmd) => cmd,
                    None => {
                        tracing::warn!("Channel disconnected, shutting down");
                        break;
                    }
                },
            };

            match cmd {
                Command::Append(obs, reply) => {
                    let mut batch: Vec<PendingAppend> = vec![(obs, reply)];
                    while batch.len() < self.batch_size {
                        match self.rx.try_recv() {
                            Ok(Command::Append(obs, reply)) => batch.push((obs, reply)),
                            Ok(other) => {
                                deferred = Some(other);
                                break;
                            }
                            Err(_) => break,
                        }
                    }
                    self.commit_batch(batch).await;
                }
                Command::Prune(cutoff, reply) => {
                    let result = self.prune(cutoff).await;
                    if let Err(e) = &result {
                        tracing::error!(error = %e, "Prune failed");
                    }
                    let _ = reply.send(result);
                }
                Command::Checkpoint(reply) => {
                    let result = self.checkpoint().await;
                    if let Err(e) = &result {
                        tracing::error!(error = %e, "Checkpoint failed");
                    }
                    let _ = reply.send(result);
                }
                Command::Shutdown => {
                    tracing::info!("DbActor shutting down");
                    // Answer anything that raced in behind the shutdown request.
                    self.rx.close();
                    let mut rest = Vec::new();
                    while let Some(cmd) = self.rx.recv().await {
                        match cmd {
                            Command::Append(obs, reply) => rest.push((obs, reply)),
                            Command::Prune(_, reply) => {
                                let _ = reply.send(Err(StorageError::ChannelClosed));
                            }
                            Command::Checkpoint(reply) => {
                                let _ = reply.send(Err(StorageError::ChannelClosed));
                            }
                            Command::Shutdown => {}
                        }
                    }
                    if !rest.is_empty() {
                        self.commit_batch(rest).await;
                    }
                    break;
                }
            }
        }

        if let Err(e) = self.checkpoint().await {
            tracing::warn!(error = %e, "Final checkpoint failed");
        }
        if let Err(e) = self.conn.close().await {
            tracing::warn!(error = %e, "Failed to close writer connection");
        }
        tracing::info!("DbActor stopped");
    }

    /// Commit a batch of appends in one transaction and answer every caller.
    ///
    /// Rows that cannot be encoded are answered up front and never join the
    /// transaction. If the transaction still fails, each row is retried in
    /// its own so one bad row cannot fail the others.
    async fn commit_batch(&mut self, batch: Vec<PendingAppend>) {
        let mut rows = Vec::with_capacity(batch.len());
        for (obs, reply) in batch {
            match Row::encode(&obs) {
                Ok(row) => rows.push((row, reply)),
                Err(e) => {
                    tracing::warn!(source = %obs.source, error = %e, "Rejected observation");
                    let _ = reply.send(Err(e));
                }
            }
        }
        if rows.is_empty() {
            return;
        }

        let count = rows.len();
        let encoded: Vec<&Row> = rows.iter().map(|(row, _)| row).collect();
        match self.insert_rows(&encoded).await {
            Ok(ids) => {
                tracing::debug!(count, "Observations committed");
                for ((_, reply), id) in rows.into_iter().zip(ids) {
                    let _ = reply.send(Ok(id));
                }
            }
            Err(e) if count == 1 => {
                tracing::error!(error = %e, "Observation insert failed");
                for (_, reply) in rows {
                    let _ = reply.send(Err(StorageError::Write(e.to_string())));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, count, "Batch insert failed, retrying rows one by one");
                for (row, reply) in rows {
                    let result = match self.insert_rows(&[&row]).await {
                        Ok(ids) => ids
                            .first()
                            .copied()
                            .ok_or_else(|| StorageError::Internal("insert returned no id".into())),
                        Err(e) => Err(StorageError::Write(e.to_string())),
                    };
                    if let Err(e) = &result {
                        tracing::error!(source = %row.source, error = %e, "Observation insert failed");
                    }
                    let _ = reply.send(result);
                }
            }
        }
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Insert rows in one transaction; returns their ids in order.
    async fn insert_rows(&mut self, rows: &[&Row]) -> Result<Vec<i64>, StorageError> {
        let mut tx = self.conn.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());

        for row in rows {
            let id = sqlx::query(
                "INSERT INTO observations (collected_at, source, value_num, payload)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(row.collected_at)
            .bind(&row.source)
            .bind(row.value_num)
            .bind(row.payload.as_deref())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn prune(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let deleted = sqlx::query("DELETE FROM observations WHERE collected_at < ?")
            .bind(cutoff.timestamp_micros())
            .execute(&mut self.conn)
            .await?
            .rows_affected();
        tracing::info!(deleted, cutoff = %cutoff, "Observations pruned");
        Ok(deleted)
    }

    async fn checkpoint(&mut self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&mut self.conn)
            .await?;
        tracing::debug!("WAL checkpoint completed");
        Ok(())
    }
}
