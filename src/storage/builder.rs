//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing all storage facades.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::storage::StorageError;
use crate::storage::actor::{DEFAULT_BATCH_SIZE, DbActor};
use crate::storage::schema::init_schema;
use crate::storage::{ObservationReader, StorageAdmin, StorageWriter};

/// Default channel capacity for writer commands.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Default read pool size.
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// How long a reader waits for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for constructing the storage layer.
#[derive(Debug, Clone)]
pub struct StorageBuilder {
    db_path: PathBuf,
    pool_size: u32,
    channel_capacity: usize,
    batch_size: usize,
}

impl StorageBuilder {
    /// Create a new storage builder for the database file at `db_path`.
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            pool_size: DEFAULT_POOL_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the connection pool size for readers.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the channel capacity for writer commands.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the maximum number of appends committed per transaction.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Database file location.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open the database, apply the schema, and spawn the writer actor.
    ///
    /// Safe to run against an existing database: the schema step is a no-op
    /// when it is already current, and fails with
    /// [`StorageError::Migration`] when the file was written by an
    /// incompatible (newer) schema.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = self.db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Internal(format!(
                    "Failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut write_conn = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(BUSY_TIMEOUT)
            .connect()
            .await?;
        init_schema(&mut write_conn).await?;

        let read_options = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .read_only(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(self.pool_size.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(read_options)
            .await?;

        let (actor_handle, tx) = DbActor::spawn(write_conn, self.channel_capacity, self.batch_size);

        tracing::info!(
            path = %self.db_path.display(),
            pool_size = self.pool_size,
            "Storage ready"
        );

        Ok(StorageHandles {
            writer: StorageWriter::new(tx.clone()),
            reader: ObservationReader::new(pool.clone()),
            admin: StorageAdmin::new(tx),
            pool,
            actor_handle: Mutex::new(Some(actor_handle)),
        })
    }
}

/// Handles to all storage layer facades.
pub struct StorageHandles {
    /// Append-only writer (used by the sampler).
    pub writer: StorageWriter,
    /// Read facade.
    pub reader: ObservationReader,
    /// Maintenance facade.
    pub admin: StorageAdmin,
    pool: sqlx::SqlitePool,
    actor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for StorageHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandles").finish_non_exhaustive()
    }
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer.
    ///
    /// Appends already queued are committed before the writer stops.
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        let Some(handle) = self.actor_handle.lock().await.take() else {
            return Ok(());
        };

        self.admin.request_shutdown().await?;
        handle
            .await
            .map_err(|e| StorageError::Internal(format!("Failed to join writer actor: {e}")))?;
        self.pool.close().await;

        tracing::info!("Storage shut down");
        Ok(())
    }
}
