//! Storage Layer
//!
//! Durable SQLite (WAL) storage with read/write separation:
//! - **Writer**: one async task owns the only write connection and commits
//!   appends received over a tokio mpsc channel
//! - **Reader**: read-only connection pool; WAL snapshots keep readers and
//!   the writer from blocking each other
//!
//! # Components
//!
//! - [`StorageWriter`]: Append facade, resolves after commit
//! - [`ObservationReader`]: Lazy range queries and per-source summaries
//! - [`StorageAdmin`]: Pruning and checkpoints
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and lifecycle management

mod actor;
mod builder;
mod error;
mod facades;
mod schema;
mod stream;
mod types;

pub use builder::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_POOL_SIZE, StorageBuilder, StorageHandles};
pub use error::StorageError;
pub use facades::{ObservationReader, StorageAdmin, StorageWriter};
pub use schema::init_schema;
pub use stream::{ObservationStream, PAGE_SIZE, SourceSelector};
pub use types::{Observation, ObservationValue, SourceSummary};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use futures::{StreamExt, TryStreamExt};
    use tempfile::{TempDir, tempdir};

    async fn open() -> (StorageHandles, TempDir) {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("store.db"))
            .pool_size(2)
            .build()
            .await
            .unwrap();
        (handles, dir)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    async fn collect(
        handles: &StorageHandles,
        selector: SourceSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Observation> {
        handles
            .reader
            .query(selector, start, end)
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_range_is_inclusive_and_ordered() {
        let (handles, _dir) = open().await;

        // Appended out of order on purpose.
        for secs in [30, 10, 50, 20, 40] {
            handles
                .writer
                .append(Observation::new("cpu", at(secs), secs as f64))
                .await
                .unwrap();
        }
        handles
            .writer
            .append(Observation::new("mem", at(20), 1.0))
            .await
            .unwrap();

        let rows = collect(&handles, SourceSelector::Exact("cpu".into()), at(20), at(40)).await;
        let times: Vec<_> = rows.iter().map(|o| o.collected_at).collect();
        assert_eq!(times, vec![at(20), at(30), at(40)]);
        assert!(rows.iter().all(|o| o.source == "cpu" && o.id.is_some()));

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_timestamps_are_kept() {
        let (handles, _dir) = open().await;

        for v in [1.0, 2.0, 3.0] {
            handles
                .writer
                .append(Observation::new("cpu", at(0), v))
                .await
                .unwrap();
        }

        let rows = collect(&handles, SourceSelector::Exact("cpu".into()), at(0), at(0)).await;
        let values: Vec<_> = rows.iter().filter_map(|o| o.value.as_f64()).collect();
        // Equal timestamps fall back to insertion order.
        assert_eq!(values, vec![1.0, 2.0, 3.0]);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_prefix_selector() {
        let (handles, _dir) = open().await;

        for source in ["net.tcp", "net.http", "host.load", "network"] {
            handles
                .writer
                .append(Observation::new(source, at(0), 1.0))
                .await
                .unwrap();
        }

        let rows = collect(&handles, SourceSelector::Prefix("net.".into()), at(0), at(0)).await;
        let mut sources: Vec<_> = rows.into_iter().map(|o| o.source).collect();
        sources.sort();
        assert_eq!(sources, vec!["net.http", "net.tcp"]);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_structured_payload_roundtrip() {
        let (handles, _dir) = open().await;
        let doc = serde_json::json!({"status": 200, "latency_ms": 12.5});

        handles
            .writer
            .append(Observation::new("web", at(0), doc.clone()))
            .await
            .unwrap();

        let rows = collect(&handles, SourceSelector::All, at(0), at(0)).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, ObservationValue::Structured(doc));

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_range_yields_empty_stream() {
        let (handles, _dir) = open().await;
        handles
            .writer
            .append(Observation::new("cpu", at(0), 42.0))
            .await
            .unwrap();

        let future = Utc::now() + Duration::days(365);
        let rows = collect(
            &handles,
            SourceSelector::Exact("cpu".into()),
            future,
            future + Duration::hours(1),
        )
        .await;
        assert!(rows.is_empty());

        // Empty database.
        let rows = collect(&handles, SourceSelector::Exact("nope".into()), at(0), at(10)).await;
        assert!(rows.is_empty());

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_spans_multiple_pages() {
        let (handles, _dir) = open().await;
        let total = PAGE_SIZE * 2 + 17;

        for i in 0..total {
            handles
                .writer
                .append(Observation::new("cpu", at(i), i as f64))
                .await
                .unwrap();
        }

        let rows = collect(&handles, SourceSelector::All, at(0), at(total)).await;
        assert_eq!(rows.len() as i64, total);
        assert!(rows.windows(2).all(|w| w[0].collected_at <= w[1].collected_at));

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_ends_on_exact_page_boundary() {
        let (handles, _dir) = open().await;
        for i in 0..PAGE_SIZE {
            handles
                .writer
                .append(Observation::new("cpu", at(i), 1.0))
                .await
                .unwrap();
        }

        let rows = collect(&handles, SourceSelector::All, at(0), at(PAGE_SIZE)).await;
        assert_eq!(i64::try_from(rows.len()).unwrap(), PAGE_SIZE);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_ignores_rows_appended_after_start() {
        let (handles, _dir) = open().await;
        for i in 0..3 {
            handles
                .writer
                .append(Observation::new("cpu", at(i), 1.0))
                .await
                .unwrap();
        }

        let mut stream = handles
            .reader
            .query(SourceSelector::All, at(0), at(1_000));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.collected_at, at(0));

        handles
            .writer
            .append(Observation::new("cpu", at(500), 1.0))
            .await
            .unwrap();

        let rest: Vec<_> = stream.try_collect().await.unwrap();
        assert_eq!(rest.len(), 2);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_readers_only_see_complete_rows_during_writes() {
        let (handles, _dir) = open().await;
        let writer = handles.writer.clone();

        let producer = tokio::spawn(async move {
            for i in 0..200 {
                let doc = serde_json::json!({"seq": i, "blob": "x".repeat(512)});
                writer
                    .append(Observation::new("bulk", at(i), doc))
                    .await
                    .unwrap();
            }
        });

        let mut last_seen = 0;
        while !producer.is_finished() {
            let rows = collect(&handles, SourceSelector::Exact("bulk".into()), at(0), at(1_000)).await;
            for (expected, obs) in rows.iter().enumerate() {
                let ObservationValue::Structured(doc) = &obs.value else {
                    panic!("unexpected value {:?}", obs.value);
                };
                assert_eq!(doc["seq"], serde_json::json!(expected));
                assert_eq!(doc["blob"].as_str().map(str::len), Some(512));
            }
            assert!(rows.len() >= last_seen, "committed rows never disappear");
            last_seen = rows.len();
            tokio::task::yield_now().await;
        }
        producer.await.unwrap();

        let rows = collect(&handles, SourceSelector::Exact("bulk".into()), at(0), at(1_000)).await;
        assert_eq!(rows.len(), 200);

        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_sources_summary() {
        let (handles, _dir) = open().await;
        for (source, secs) in [("b", 5), ("a", 1), ("a", 3)] {
            handles
                .writer
                .append(Observation::new(source, at(secs), 1.0))
                .await
                .unwrap();
        }

        let summary = handles.reader.sources().await.unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].source, "a");
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].first_at, at(1));
        assert_eq!(summary[0].last_at, at(3));
        assert_eq!(summary[1].source, "b");

        handles.admin.checkpoint().await.unwrap();
        handles.shutdown().await.unwrap();
    }
}
