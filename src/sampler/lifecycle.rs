//! Lifecycle controller: one-time storage initialization and idempotent
//! start/stop of the single sampler loop.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::collector::CollectorError;
use crate::config::AppConfig;
use crate::query::QueryFacade;
use crate::sampler::clock::base_resolution;
use crate::sampler::job::SampleJob;
use crate::sampler::runner::TickLoop;
use crate::sampler::state::StateHandle;
use crate::storage::{StorageBuilder, StorageError, StorageHandles};

/// How long `stop()` waits for the loop to drain before aborting it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors returned by [`Lifecycle`].
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Storage could not be opened or migrated.
    #[error("storage init failed: {0}")]
    StorageInit(#[source] StorageError),

    /// `start()` or a storage accessor was called before `init()`.
    #[error("lifecycle not initialized")]
    NotInitialized,

    /// A configured job could not be built.
    #[error("job '{name}' is invalid: {source}")]
    Job {
        name: String,
        #[source]
        source: CollectorError,
    },

    /// Storage failed during shutdown.
    #[error("storage shutdown failed: {0}")]
    Shutdown(#[source] StorageError),
}

/// Sampler tuning that is not part of an individual job.
#[derive(Debug, Clone, Default)]
pub struct SamplerSettings {
    /// Base tick resolution; derived from job intervals when `None`.
    pub resolution: Option<Duration>,
    /// Observations older than this are pruned; kept forever when `None`.
    pub retention: Option<Duration>,
    /// Drain bound for `stop()`; [`DEFAULT_STOP_TIMEOUT`] when `None`.
    pub stop_timeout: Option<Duration>,
}

struct RunningLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns storage handles, the sampler state and the running loop.
///
/// All operations are idempotent and safe to call from any task.
pub struct Lifecycle {
    storage: StorageBuilder,
    jobs: Vec<SampleJob>,
    settings: SamplerSettings,
    handles: OnceCell<StorageHandles>,
    state: StateHandle,
    control: Mutex<Option<RunningLoop>>,
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("db_path", &self.storage.db_path())
            .field("jobs", &self.jobs)
            .field("initialized", &self.handles.initialized())
            .field("running", &self.state.is_running())
            .finish()
    }
}

impl Lifecycle {
    pub fn new(storage: StorageBuilder, jobs: Vec<SampleJob>, settings: SamplerSettings) -> Self {
        let state = StateHandle::new(jobs.iter().map(|job| job.name().to_string()));
        Self {
            storage,
            jobs,
            settings,
            handles: OnceCell::new(),
            state,
            control: Mutex::new(None),
        }
    }

    /// Build storage settings and jobs from configuration. Disabled jobs are skipped.
    pub fn from_config(config: &AppConfig) -> Result<Self, LifecycleError> {
        let jobs = config
            .jobs
            .iter()
            .filter(|job| job.enabled)
            .map(|job| {
                SampleJob::from_spec(&job.name, job.interval, job.timeout, &job.collector).map_err(
                    |source| LifecycleError::Job {
                        name: job.name.clone(),
                        source,
                    },
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let storage = StorageBuilder::new(&config.database.path)
            .pool_size(config.database.pool_size)
            .channel_capacity(config.database.channel_capacity);

        let settings = SamplerSettings {
            resolution: config.sampler.resolution,
            retention: config.database.retention,
            stop_timeout: None,
        };
        Ok(Self::new(storage, jobs, settings))
    }

    /// Open storage and apply the schema. Runs at most once; later calls
    /// return immediately. A failed attempt may be retried.
    pub async fn init(&self) -> Result<(), LifecycleError> {
        self.handles
            .get_or_try_init(|| async {
                tracing::info!(path = %self.storage.db_path().display(), "Initializing storage");
                self.storage
                    .clone()
                    .build()
                    .await
                    .map_err(LifecycleError::StorageInit)
            })
            .await?;
        Ok(())
    }

    /// Start the sampler loop. No-op if already running.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let handles = self.storage()?;
        let mut control = self.control.lock().await;

        if let Some(running) = control.as_ref() {
            if !running.handle.is_finished() {
                tracing::debug!("Sampler already running");
                return Ok(());
            }
            tracing::warn!("Sampler loop exited unexpectedly, restarting");
        }

        let resolution = self
            .settings
            .resolution
            .unwrap_or_else(|| base_resolution(self.jobs.iter().map(SampleJob::interval)));
        let tick_loop = TickLoop::new(
            &self.jobs,
            resolution,
            handles.writer.clone(),
            handles.admin.clone(),
            self.settings.retention,
            self.state.clone(),
        );

        let token = CancellationToken::new();
        self.state.mark_started();
        let handle = tokio::spawn(tick_loop.run(token.clone()));
        *control = Some(RunningLoop { token, handle });
        Ok(())
    }

    /// Stop the sampler loop, waiting for in-flight jobs. No-op if not running.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        let Some(RunningLoop { token, mut handle }) = control.take() else {
            return;
        };

        token.cancel();
        let stop_timeout = self.settings.stop_timeout.unwrap_or(DEFAULT_STOP_TIMEOUT);
        match tokio::time::timeout(stop_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Sampler loop failed"),
            Err(_) => {
                tracing::warn!(timeout = ?stop_timeout, "Sampler did not stop in time, aborting");
                handle.abort();
                // Wait for the aborted loop to be dropped so it cannot touch a restarted one's state.
                let _ = handle.await;
            }
        }
        self.state.mark_stopped();
    }

    /// Stop the sampler and close storage.
    pub async fn shutdown(&self) -> Result<(), LifecycleError> {
        self.stop().await;
        if let Some(handles) = self.handles.get() {
            handles.shutdown().await.map_err(LifecycleError::Shutdown)?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.handles.initialized()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Shared sampler state.
    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn jobs(&self) -> &[SampleJob] {
        &self.jobs
    }

    /// Storage handles, available after `init()`.
    pub fn storage(&self) -> Result<&StorageHandles, LifecycleError> {
        self.handles.get().ok_or(LifecycleError::NotInitialized)
    }

    /// Query façade over the initialized store.
    pub fn query(&self) -> Result<QueryFacade, LifecycleError> {
        Ok(QueryFacade::new(self.storage()?.reader.clone()))
    }
}
