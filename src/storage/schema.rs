//! Database schema management.
//!
//! The schema lives in `migrations/` and is embedded at compile time.
//! Applying it is idempotent; a database that records migrations this
//! binary does not know about is rejected as incompatible.

use sqlx::SqliteConnection;
use sqlx::migrate::Migrator;

use crate::storage::StorageError;

/// Embedded migrations from `./migrations`.
pub static MIGRATOR: Migrator = sqlx::migrate!();

/// Initialize (or verify) the database schema on the given connection.
pub async fn init_schema(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    MIGRATOR.run(conn).await?;
    tracing::info!("Database schema initialized");
    Ok(())
}
