//! Lazy, ordered observation streams.
//!
//! A query is executed page by page with keyset pagination on
//! `(collected_at, id)`. Each page is a short read on a pooled connection,
//! so a slow consumer never holds a read transaction open. The stream is
//! capped at the highest row id visible when it was first polled, which
//! keeps it finite while the sampler keeps appending.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::storage::StorageError;
use crate::storage::types::{Observation, ObservationValue, from_micros};

/// Rows fetched per page.
pub const PAGE_SIZE: i64 = 256;

/// Ordered (by `collected_at`, then `id`) stream of stored observations.
pub type ObservationStream = BoxStream<'static, Result<Observation, StorageError>>;

/// Which sources a query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelector {
    /// Every source.
    All,
    /// Exactly this source.
    Exact(String),
    /// Every source starting with this prefix.
    Prefix(String),
}

/// Query state carried between pages.
struct Cursor {
    pool: SqlitePool,
    selector: SourceSelector,
    start_us: i64,
    end_us: i64,
    /// Highest id the query may return; `None` until the first page.
    ceiling: Option<i64>,
    /// Last `(collected_at, id)` emitted.
    after: Option<(i64, i64)>,
    buffer: VecDeque<Observation>,
    exhausted: bool,
}

/// Build a lazy stream over observations with `start_us <= collected_at <= end_us`.
pub(crate) fn observation_stream(
    pool: SqlitePool,
    selector: SourceSelector,
    start_us: i64,
    end_us: i64,
) -> ObservationStream {
    let cursor = Cursor {
        pool,
        selector,
        start_us,
        end_us,
        ceiling: None,
        after: None,
        buffer: VecDeque::new(),
        exhausted: start_us > end_us,
    };

    stream::try_unfold(cursor, |mut cursor| async move {
        loop {
            if let Some(obs) = cursor.buffer.pop_front() {
                return Ok::<_, StorageError>(Some((obs, cursor)));
            }
            if cursor.exhausted {
                return Ok::<_, StorageError>(None);
            }
            cursor.fetch_page().await?;
        }
    })
    .boxed()
}

impl Cursor {
    async fn fetch_page(&mut self) -> Result<(), StorageError> {
        let ceiling = match self.ceiling {
            Some(c) => c,
            None => {
                let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM observations")
                    .fetch_one(&self.pool)
                    .await?;
                match max {
                    Some(c) => {
                        self.ceiling = Some(c);
                        c
                    }
                    None => {
                        self.exhausted = true;
                        return Ok(());
                    }
                }
            }
        };

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, collected_at, source, value_num, payload FROM observations WHERE id <= ",
        );
        qb.push_bind(ceiling);

        match &self.selector {
            SourceSelector::All => {}
            SourceSelector::Exact(source) => {
                qb.push(" AND source = ").push_bind(source.clone());
            }
            SourceSelector::Prefix(prefix) => {
                let len = i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX);
                qb.push(" AND substr(source, 1, ")
                    .push_bind(len)
                    .push(") = ")
                    .push_bind(prefix.clone());
            }
        }

        match self.after {
            None => {
                qb.push(" AND collected_at >= ").push_bind(self.start_us);
            }
            Some((ts, id)) => {
                qb.push(" AND (collected_at > ")
                    .push_bind(ts)
                    .push(" OR (collected_at = ")
                    .push_bind(ts)
                    .push(" AND id > ")
                    .push_bind(id)
                    .push("))");
            }
        }
        qb.push(" AND collected_at <= ").push_bind(self.end_us);
        qb.push(" ORDER BY collected_at ASC, id ASC LIMIT ")
            .push_bind(PAGE_SIZE);

        let rows = qb.build().fetch_all(&self.pool).await?;
        if i64::try_from(rows.len()).is_ok_and(|n| n < PAGE_SIZE) {
            self.exhausted = true;
        }

        for row in &rows {
            let obs = decode_row(row)?;
            self.after = Some((obs.collected_at.timestamp_micros(), obs.id.unwrap_or_default()));
            self.buffer.push_back(obs);
        }
        Ok(())
    }
}

/// Decode one `observations` row.
pub(crate) fn decode_row(row: &SqliteRow) -> Result<Observation, StorageError> {
    let id: i64 = row.try_get("id")?;
    let collected_at = from_micros(row.try_get("collected_at")?)?;
    let source: String = row.try_get("source")?;
    let value_num: Option<f64> = row.try_get("value_num")?;
    let payload: Option<String> = row.try_get("payload")?;

    let value = match (value_num, payload) {
        (Some(v), _) => ObservationValue::Number(v),
        (None, Some(doc)) => ObservationValue::Structured(serde_json::from_str(&doc)?),
        (None, None) => {
            return Err(StorageError::InvalidData(format!(
                "observation {id} has no value"
            )));
        }
    };

    Ok(Observation {
        id: Some(id),
        collected_at,
        source,
        value,
    })
}
