//! Errors returned by the observation store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Database(#[from] sqlx::Error),

    /// The on-disk schema could not be brought to the current version.
    #[error("schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The batch transaction was rolled back; none of its observations were stored.
    #[error("append not committed: {0}")]
    Write(String),

    /// The writer task is gone and no longer accepts appends.
    #[error("observation writer is not running")]
    ChannelSend,

    /// The writer task stopped before acknowledging a command.
    #[error("observation writer stopped before replying")]
    ChannelClosed,

    #[error("observation value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row could not be decoded, e.g. a timestamp out of range.
    #[error("corrupt row: {0}")]
    InvalidData(String),

    #[error("storage task failed: {0}")]
    Internal(String),
}
