//! Wiring of the offline layer from an [`OfflineConfig`].

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cache::ReadCache;
use crate::config::OfflineConfig;
use crate::db::LocalDb;
use crate::error::{OfflineError, OfflineResult};
use crate::interceptor::OfflineInterceptor;
use crate::mutation_queue::MutationQueue;
use crate::offline::Connectivity;
use crate::reconcile::{Reconciler, ReplayPolicy, ReplayReport};
use crate::replay_worker::{Backoff, ReplayWorker};
use crate::routes::OfflineDefaults;
use crate::transport::{HttpTransport, Transport};
use crate::types::{ApiRequest, ApiResponse, PendingMutation};

/// The application's single entry point to the backend.
pub struct OfflineClient<T = HttpTransport> {
    config: OfflineConfig,
    db: LocalDb,
    interceptor: OfflineInterceptor<Arc<T>>,
    reconciler: Arc<Reconciler<Arc<T>>>,
}

impl OfflineClient<HttpTransport> {
    /// Open the local database and connect over HTTP.
    pub async fn open(config: OfflineConfig) -> OfflineResult<Self> {
        let transport = HttpTransport::new(&config.base_url, config.request_timeout)
            .map_err(|e| OfflineError::InvalidConfig(e.to_string()))?;
        Self::with_transport(config, transport, OfflineDefaults::standard()).await
    }
}

impl<T: Transport + 'static> OfflineClient<T> {
    pub async fn with_transport(
        config: OfflineConfig,
        transport: T,
        defaults: OfflineDefaults,
    ) -> OfflineResult<Self> {
        let db = LocalDb::open(&config.database).await?;
        let cache = ReadCache::open(db.clone(), config.cache_generation.clone()).await?;
        let queue = MutationQueue::new(db.clone());
        let connectivity = Arc::new(Connectivity::default());
        let transport = Arc::new(transport);

        let interceptor = OfflineInterceptor::new(
            transport.clone(),
            cache.clone(),
            queue.clone(),
            defaults,
            connectivity.clone(),
        )?;
        let reconciler = Arc::new(Reconciler::new(
            transport,
            queue.clone(),
            cache,
            db.clone(),
            connectivity,
            ReplayPolicy {
                max_attempts: config.max_replay_attempts,
                max_age: config.max_mutation_age,
            },
        ));

        let pending = queue.len().await?;
        tracing::info!(
            base_url = %config.base_url,
            generation = %config.cache_generation,
            pending,
            "offline client ready"
        );

        Ok(Self {
            config,
            db,
            interceptor,
            reconciler,
        })
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &Arc<Connectivity> {
        self.interceptor.connectivity()
    }

    pub async fn request(&self, request: ApiRequest) -> OfflineResult<ApiResponse> {
        self.interceptor.request(request).await
    }

    pub async fn get(&self, path: impl Into<String>) -> OfflineResult<ApiResponse> {
        self.interceptor.get(path).await
    }

    pub async fn post(&self, path: impl Into<String>, body: Value) -> OfflineResult<ApiResponse> {
        self.interceptor.post(path, body).await
    }

    pub async fn put(&self, path: impl Into<String>, body: Value) -> OfflineResult<ApiResponse> {
        self.interceptor.put(path, body).await
    }

    pub async fn delete(&self, path: impl Into<String>) -> OfflineResult<ApiResponse> {
        self.interceptor.delete(path).await
    }

    pub async fn pending(&self) -> OfflineResult<Vec<PendingMutation>> {
        self.interceptor.queue().pending().await
    }

    /// Server identity for a provisional one, once replay has confirmed it.
    pub async fn resolve_identity(&self, provisional_id: &str) -> OfflineResult<Option<String>> {
        self.db.resolve_identity(provisional_id).await
    }

    /// Replay now, on the caller's task.
    pub async fn replay(&self, cancel: &CancellationToken) -> OfflineResult<ReplayReport> {
        self.reconciler.replay(cancel).await
    }

    pub fn replay_worker(&self, shutdown: CancellationToken) -> ReplayWorker<Arc<T>> {
        ReplayWorker::new(
            self.reconciler.clone(),
            self.connectivity().clone(),
            self.config.probe_interval,
            Backoff::new(self.config.initial_backoff, self.config.max_backoff),
            shutdown,
        )
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}
