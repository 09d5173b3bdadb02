//! API Integration Tests
//!
//! Drives the HTTP API over a real listener while the sampler writes.

use std::time::Duration;

use cadence::collector::{CollectorSpec, CommandConfig, TcpConfig};
use cadence::config::{AppConfig, JobConfig};
use cadence::sampler::Lifecycle;
use cadence::server::{AppState, create_router};
use cadence::storage::{Observation, ObservationValue, StorageBuilder, StorageHandles};
use cadence::{QueryFacade, StateHandle};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

// =============================================================================
// Test Helpers
// =============================================================================

async fn serve(state: AppState) -> String {
    let router = create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Start a server over a store seeded with fixed observations.
async fn start_seeded_server() -> (String, StorageHandles, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let handles = StorageBuilder::new(dir.path().join("api.db"))
        .channel_capacity(100)
        .build()
        .await
        .expect("Failed to build storage");

    for (source, minute, value) in [
        ("cpu", 0, json!(10.0)),
        ("cpu", 1, json!(11.0)),
        ("cpu", 2, json!(12.0)),
        ("web.home", 1, json!({"status": 200, "latency_ms": 12.5})),
        ("web.api", 2, json!({"status": 503, "latency_ms": 80.0})),
    ] {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap();
        let value: ObservationValue = match value {
            Value::Number(n) => n.as_f64().unwrap().into(),
            other => other.into(),
        };
        handles
            .writer
            .append(Observation {
                id: None,
                collected_at: at,
                source: source.to_string(),
                value,
            })
            .await
            .unwrap();
    }

    let base_url = serve(AppState {
        query: QueryFacade::new(handles.reader.clone()),
        sampler: StateHandle::new(["cpu"]),
    })
    .await;
    (base_url, handles, dir)
}

async fn get(url: String) -> (u16, Value) {
    let resp = reqwest::get(url).await.expect("request failed");
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

// =============================================================================
// Health Probe Tests
// =============================================================================

#[tokio::test]
async fn test_health_probes() {
    let (base_url, handles, _dir) = start_seeded_server().await;

    let (status, body) = get(format!("{base_url}/healthz")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, body) = get(format!("{base_url}/readyz")).await;
    assert_eq!(status, 200);
    assert_eq!(body["db"], "ready");

    handles.shutdown().await.unwrap();
}

// =============================================================================
// Observations API Tests
// =============================================================================

#[tokio::test]
async fn test_observations_range_is_inclusive_and_ordered() {
    let (base_url, handles, _dir) = start_seeded_server().await;

    let (status, body) = get(format!(
        "{base_url}/api/observations?source=cpu&start=2025-06-01T12:00:00Z&end=2025-06-01T12:01:00Z"
    ))
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 2);
    let values: Vec<f64> = body["observations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["value"].as_f64().unwrap())
        .collect();
    assert_eq!(values, vec![10.0, 11.0]);

    handles.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_observations_prefix_and_limit() {
    let (base_url, handles, _dir) = start_seeded_server().await;

    let (status, body) = get(format!(
        "{base_url}/api/observations?prefix=web.&end=2025-06-01T12:10:00Z&range=1h"
    ))
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 2);
    assert_eq!(body["observations"][0]["source"], "web.home");
    assert_eq!(body["observations"][0]["value"]["status"], 200);
    assert_eq!(body["observations"][1]["source"], "web.api");

    let (status, body) = get(format!(
        "{base_url}/api/observations?end=2025-06-01T12:10:00Z&range=1h&limit=3"
    ))
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 3);

    handles.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_observations_future_range_is_empty() {
    let (base_url, handles, _dir) = start_seeded_server().await;

    let (status, body) = get(format!(
        "{base_url}/api/observations?source=cpu&start=2999-01-01T00:00:00Z&end=2999-01-02T00:00:00Z"
    ))
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 0);
    assert_eq!(body["observations"], json!([]));

    handles.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_observations_malformed_input() {
    let (base_url, handles, _dir) = start_seeded_server().await;

    for query in [
        "start=2025-06-02T00:00:00Z&end=2025-06-01T00:00:00Z",
        "source=cpu&prefix=web.",
        "range=eventually",
        "end=not-a-time",
        "limit=0",
    ] {
        let (status, body) = get(format!("{base_url}/api/observations?{query}")).await;
        assert_eq!(status, 400, "query {query} should be rejected");
        assert!(body["error"].is_string(), "query {query} missing error body");
    }

    handles.shutdown().await.unwrap();
}

// =============================================================================
// Sources / Sampler API Tests
// =============================================================================

#[tokio::test]
async fn test_sources_summary() {
    let (base_url, handles, _dir) = start_seeded_server().await;

    let (status, body) = get(format!("{base_url}/api/sources")).await;
    assert_eq!(status, 200);
    let sources = body.as_array().unwrap();
    assert_eq!(sources.len(), 3);
    assert_eq!(sources[0]["source"], "cpu");
    assert_eq!(sources[0]["count"], 3);

    handles.shutdown().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_sampler_feeds_api() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.database.path = dir.path().join("live.db");
    config.jobs = vec![
        JobConfig::new(
            "host.answer",
            CollectorSpec::Command(CommandConfig::new("sh", ["-c", "echo 42"])),
        )
        .with_interval(Duration::from_millis(200))
        .with_timeout(Duration::from_millis(200)),
        JobConfig::new(
            "closed.port",
            CollectorSpec::Tcp(TcpConfig::new("127.0.0.1", 1)),
        )
        .with_interval(Duration::from_millis(200))
        .with_timeout(Duration::from_millis(100)),
    ];
    config.validate().unwrap();

    let lifecycle = Lifecycle::from_config(&config).unwrap();
    lifecycle.init().await.unwrap();
    lifecycle.start().await.unwrap();

    let base_url = serve(AppState {
        query: lifecycle.query().unwrap(),
        sampler: lifecycle.state().clone(),
    })
    .await;

    tokio::time::sleep(Duration::from_millis(700)).await;

    let (status, body) = get(format!(
        "{base_url}/api/observations?source=host.answer&range=1m"
    ))
    .await;
    assert_eq!(status, 200);
    assert!(body["count"].as_u64().unwrap() >= 2);
    assert_eq!(body["observations"][0]["value"], 42.0);

    let (status, body) = get(format!("{base_url}/api/sampler")).await;
    assert_eq!(status, 200);
    assert_eq!(body["running"], true);
    assert_eq!(body["jobs"]["closed.port"]["last_error"]["kind"], "collection");
    assert_eq!(body["last_error"]["job"], "closed.port");

    lifecycle.shutdown().await.unwrap();
}
