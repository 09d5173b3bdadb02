//! HTTP server module.
//!
//! Read-only JSON API over the query façade and sampler state.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::config::parse_duration;
use crate::query::{QueryError, QueryFacade, SourceFilter, TimeRange};
use crate::sampler::StateHandle;
use crate::storage::Observation;

/// Default number of observations returned by `/api/observations`.
pub const DEFAULT_LIMIT: usize = 1_000;

/// Upper bound on `limit`; larger requests are clamped.
pub const MAX_LIMIT: usize = 10_000;

/// Window used when neither `start` nor `range` is given.
fn default_range() -> chrono::Duration {
    chrono::Duration::hours(1)
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub query: QueryFacade,
    pub sampler: StateHandle,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct ObservationsResponse {
    count: usize,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    observations: Vec<Observation>,
}

/// Query parameters for the observations API.
#[derive(Debug, Default, Deserialize)]
pub struct ObservationsQueryParams {
    /// Exact source name.
    pub source: Option<String>,
    /// Source name prefix.
    pub prefix: Option<String>,
    /// RFC 3339 range start.
    pub start: Option<String>,
    /// RFC 3339 range end (default: now).
    pub end: Option<String>,
    /// Relative window ending at `end`, e.g. `15m` or `24h`.
    pub range: Option<String>,
    pub limit: Option<usize>,
}

impl ObservationsQueryParams {
    fn filter(&self) -> Result<SourceFilter, QueryError> {
        let source = self.source.as_deref().filter(|s| !s.is_empty());
        let prefix = self.prefix.as_deref().filter(|s| !s.is_empty());
        match (source, prefix) {
            (Some(_), Some(_)) => Err(QueryError::InvalidParameter(
                "source and prefix are mutually exclusive".to_string(),
            )),
            (Some(source), None) => Ok(SourceFilter::Exact(source.to_string())),
            (None, Some(prefix)) => Ok(SourceFilter::Prefix(prefix.to_string())),
            (None, None) => Ok(SourceFilter::Any),
        }
    }

    fn time_range(&self) -> Result<TimeRange, QueryError> {
        let end = match self.end.as_deref() {
            Some(end) => parse_timestamp("end", end)?,
            None => Utc::now(),
        };

        let start = match (self.start.as_deref(), self.range.as_deref()) {
            (Some(_), Some(_)) => {
                return Err(QueryError::InvalidParameter(
                    "start and range are mutually exclusive".to_string(),
                ));
            }
            (Some(start), None) => parse_timestamp("start", start)?,
            (None, Some(range)) => {
                let out_of_range = || {
                    QueryError::InvalidParameter(format!("range: invalid duration '{range}'"))
                };
                let span = parse_duration(range)
                    .ok()
                    .and_then(|d| chrono::Duration::from_std(d).ok())
                    .ok_or_else(out_of_range)?;
                end.checked_sub_signed(span).ok_or_else(out_of_range)?
            }
            (None, None) => end
                .checked_sub_signed(default_range())
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        };

        Ok(TimeRange::new(start, end))
    }

    fn limit(&self) -> Result<usize, QueryError> {
        match self.limit {
            Some(0) => Err(QueryError::InvalidParameter(
                "limit must be positive".to_string(),
            )),
            Some(limit) => Ok(limit.min(MAX_LIMIT)),
            None => Ok(DEFAULT_LIMIT),
        }
    }
}

fn parse_timestamp(name: &str, value: &str) -> Result<DateTime<Utc>, QueryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| QueryError::InvalidParameter(format!("{name}: {e}")))
}

/// Query failures rendered as JSON: 400 for malformed input, 500 otherwise.
struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!(error = %self.0, "Query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/observations", get(observations_handler))
        .route("/api/sources", get(sources_handler))
        .route("/api/sampler", get(sampler_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that checks the store is reachable.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.query.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Observations in a time range, oldest first.
async fn observations_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ObservationsQueryParams>,
) -> Result<Json<ObservationsResponse>, ApiError> {
    let filter = params.filter()?;
    let range = params.time_range()?;
    let limit = params.limit()?;

    let observations = state.query.collect(&filter, range, limit).await?;
    Ok(Json(ObservationsResponse {
        count: observations.len(),
        start: range.start,
        end: range.end,
        observations,
    }))
}

async fn sources_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    Ok(Json(state.query.sources().await?).into_response())
}

async fn sampler_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.sampler.snapshot()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageBuilder, StorageHandles};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chrono::TimeZone;
    use serde_json::Value;
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    async fn create_test_state() -> (AppState, StorageHandles, TempDir) {
        let dir = tempdir().unwrap();
        let handles = StorageBuilder::new(dir.path().join("test_server.db"))
            .pool_size(2)
            .channel_capacity(100)
            .build()
            .await
            .expect("Failed to build storage");

        let state = AppState {
            query: QueryFacade::new(handles.reader.clone()),
            sampler: StateHandle::new(["cpu"]),
        };

        // Return handles AND dir to keep tempdir alive
        (state, handles, dir)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[test]
    fn test_params_time_range() {
        let params = ObservationsQueryParams {
            end: Some("2025-06-01T12:00:00Z".to_string()),
            range: Some("15m".to_string()),
            ..Default::default()
        };
        let range = params.time_range().unwrap();
        assert_eq!(range.end, Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        assert_eq!(range.start, Utc.with_ymd_and_hms(2025, 6, 1, 11, 45, 0).unwrap());

        let defaulted = ObservationsQueryParams::default().time_range().unwrap();
        assert_eq!(defaulted.end - defaulted.start, default_range());

        let both = ObservationsQueryParams {
            start: Some("2025-06-01T12:00:00Z".to_string()),
            range: Some("1h".to_string()),
            ..Default::default()
        };
        assert!(both.time_range().is_err());
    }

    #[test]
    fn test_params_limit_and_filter() {
        let mut params = ObservationsQueryParams::default();
        assert_eq!(params.limit().unwrap(), DEFAULT_LIMIT);
        params.limit = Some(50_000);
        assert_eq!(params.limit().unwrap(), MAX_LIMIT);
        params.limit = Some(0);
        assert!(params.limit().is_err());

        params.source = Some(String::new());
        assert_eq!(params.filter().unwrap(), SourceFilter::Any);
        params.prefix = Some("web.".to_string());
        assert_eq!(
            params.filter().unwrap(),
            SourceFilter::Prefix("web.".to_string())
        );
        params.source = Some("cpu".to_string());
        assert!(params.filter().is_err());
    }

    #[tokio::test]
    async fn test_observations_endpoint() {
        let (state, handles, _dir) = create_test_state().await;
        handles
            .writer
            .append(Observation::now("cpu", 42.0))
            .await
            .unwrap();

        let (status, body) = get_json(create_router(state), "/api/observations?source=cpu").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["observations"][0]["value"], 42.0);
        assert_eq!(body["observations"][0]["source"], "cpu");
    }

    #[tokio::test]
    async fn test_observations_bad_request() {
        let (state, _handles, _dir) = create_test_state().await;
        let app = create_router(state);

        let (status, body) = get_json(
            app.clone(),
            "/api/observations?start=2025-06-02T00:00:00Z&end=2025-06-01T00:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid time range"));

        let (status, _) = get_json(app.clone(), "/api/observations?range=forever").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(app, "/api/observations?start=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_range_past_earliest_time_is_bad_request() {
        let (state, _handles, _dir) = create_test_state().await;

        let (status, body) =
            get_json(create_router(state), "/api/observations?range=1000000y").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("1000000y"));
    }

    #[tokio::test]
    async fn test_storage_failure_is_server_error() {
        let (state, handles, _dir) = create_test_state().await;
        handles.shutdown().await.unwrap();

        let (status, _) = get_json(create_router(state.clone()), "/api/sources").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, body) = get_json(create_router(state), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not_ready");
    }

    #[tokio::test]
    async fn test_sampler_endpoint() {
        let (state, _handles, _dir) = create_test_state().await;
        let (status, body) = get_json(create_router(state), "/api/sampler").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], false);
        assert_eq!(body["jobs"]["cpu"]["runs"], 0);
    }
}
