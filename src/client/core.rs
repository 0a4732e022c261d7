use crate::cache::{CacheStats, FormBody, SharedCache, BYTES_PER_MB};
use crate::client::builder::InstanceBuilder;
use crate::fetch::{
    Batch, FetchOptions, FetchOrchestrator, FetchOutput, Fetched, ReturnType, WorkerPool,
};
use crate::transport::RemoteEndpoint;
use crate::{Error, ErrorContext, Result};
use arc_swap::ArcSwap;
use bytes::Bytes;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A client session against one CATMAID server.
///
/// Owns the response cache and the worker pool; every fetch goes through
/// [`CatmaidInstance::fetch`]. Safe to share between tasks behind an `Arc`.
pub struct CatmaidInstance {
    pub(crate) endpoint: Arc<dyn RemoteEndpoint>,
    pub(crate) cache: SharedCache,
    pub(crate) caching: AtomicBool,
    pub(crate) pool: ArcSwap<WorkerPool>,
    pub(crate) large_batch_warning: usize,
    pub(crate) warned_large_batch: AtomicBool,
}

impl CatmaidInstance {
    pub fn builder() -> InstanceBuilder {
        InstanceBuilder::new()
    }

    /// Session against `server` with default settings and env overrides.
    pub fn connect(server: impl Into<String>) -> Result<Self> {
        InstanceBuilder::from_env()?.server(server).build()
    }

    /// Fetch a batch. See [`crate::fetch`] for the stages.
    pub async fn fetch(&self, batch: impl Into<Batch>, options: &FetchOptions) -> Result<FetchOutput> {
        let caching = options.caching.unwrap_or_else(|| self.caching());
        let mut orchestrator = FetchOrchestrator::new(Arc::clone(&self.endpoint), self.pool.load_full());
        if caching {
            orchestrator = orchestrator
                .with_cache(&self.cache)
                .with_large_batch_warning(self.large_batch_warning, &self.warned_large_batch);
        }
        orchestrator.fetch(batch.into(), options).await
    }

    /// GET one URL and parse it as JSON, raising on any HTTP error.
    pub async fn fetch_json(&self, url: impl Into<String>) -> Result<Value> {
        let out = self.fetch(Batch::one(url), &FetchOptions::default()).await?;
        expect_json(out.into_one())
    }

    /// GET many URLs as JSON, in order.
    pub async fn fetch_json_many<I, S>(&self, urls: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let out = self.fetch(Batch::many(urls), &FetchOptions::default()).await?;
        out.into_vec()
            .into_iter()
            .map(|f| expect_json(Some(f)))
            .collect()
    }

    /// POST one form and parse the answer as JSON.
    pub async fn post_json(&self, url: impl Into<String>, form: FormBody) -> Result<Value> {
        let out = self
            .fetch(Batch::one(url).body(form), &FetchOptions::default())
            .await?;
        expect_json(out.into_one())
    }

    pub async fn fetch_raw(&self, url: impl Into<String>) -> Result<Bytes> {
        let options = FetchOptions::new().return_type(ReturnType::Raw);
        let out = self.fetch(Batch::one(url), &options).await?;
        out.into_one().and_then(Fetched::into_raw).ok_or_else(unexpected_shape)
    }

    pub fn endpoint(&self) -> &Arc<dyn RemoteEndpoint> {
        &self.endpoint
    }

    pub fn caching(&self) -> bool {
        self.caching.load(Ordering::Relaxed)
    }

    pub fn set_caching(&self, enabled: bool) {
        self.caching.store(enabled, Ordering::Relaxed);
    }

    /// Turn caching off until the returned guard is dropped.
    pub fn without_caching(&self) -> CachingGuard<'_> {
        let previous = self.caching.swap(false, Ordering::Relaxed);
        CachingGuard {
            flag: &self.caching,
            previous,
        }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear()
    }

    /// Change cache limits in place. Shrinking the size limit evicts immediately.
    pub fn setup_cache(&self, size_limit_mb: Option<u64>, time_limit: Option<Duration>) -> Result<()> {
        let size_limit = size_limit_mb.map(|mb| mb.saturating_mul(BYTES_PER_MB));
        self.cache.set_limits(size_limit, time_limit)
    }

    pub fn cache_size_bytes(&self) -> Result<u64> {
        self.cache.current_size_bytes()
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        self.cache.stats()
    }

    pub fn save_cache(&self, path: impl AsRef<Path>) -> Result<()> {
        self.cache.save(path)
    }

    /// Replace the cache with a snapshot. The restored cache has no time limit.
    pub fn load_cache(&self, path: impl AsRef<Path>) -> Result<()> {
        self.cache.load(path)
    }

    pub fn max_workers(&self) -> usize {
        self.pool.load().size()
    }

    /// Replace the worker pool. Requests already dispatched finish on the old pool.
    pub fn set_max_workers(&self, max_workers: usize) -> Result<()> {
        let pool = WorkerPool::new(max_workers)?;
        self.pool.store(Arc::new(pool));
        info!(max_workers, "worker pool replaced");
        Ok(())
    }

    /// Requests currently running on the active pool.
    pub fn in_flight(&self) -> usize {
        self.pool.load().in_flight()
    }
}

impl std::fmt::Debug for CatmaidInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatmaidInstance")
            .field("caching", &self.caching())
            .field("max_workers", &self.max_workers())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Restores the previous caching switch on drop.
#[must_use = "caching is restored as soon as the guard is dropped"]
pub struct CachingGuard<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl Drop for CachingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::Relaxed);
    }
}

fn unexpected_shape() -> Error {
    Error::runtime_with_context(
        "unexpected fetch output shape",
        ErrorContext::new().with_source("catmaid_instance"),
    )
}

fn expect_json(item: Option<Fetched>) -> Result<Value> {
    item.and_then(Fetched::into_json).ok_or_else(unexpected_shape)
}
