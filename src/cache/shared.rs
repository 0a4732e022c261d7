use super::store::{CacheStats, ResponseCache};
use crate::{Error, ErrorContext, Result};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A [`ResponseCache`] shared by every batch call of one session.
///
/// Batches may run concurrently from different tasks, so lookups, inserts and clears
/// go through one mutex. The guard is never held across an `.await`.
#[derive(Debug, Default)]
pub struct SharedCache {
    inner: Mutex<ResponseCache>,
}

impl SharedCache {
    pub fn new(cache: ResponseCache) -> Self {
        Self {
            inner: Mutex::new(cache),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, ResponseCache>> {
        self.inner.lock().map_err(|_| {
            Error::runtime_with_context(
                "response cache poisoned",
                ErrorContext::new().with_source("response_cache"),
            )
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    pub fn current_size_bytes(&self) -> Result<u64> {
        Ok(self.lock()?.current_size_bytes())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        Ok(self.lock()?.stats())
    }

    pub fn set_limits(&self, size_limit: Option<u64>, time_limit: Option<Duration>) -> Result<()> {
        let mut cache = self.lock()?;
        cache.set_size_limit(size_limit);
        cache.set_time_limit(time_limit);
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.lock()?.save(path)
    }

    /// Replace the whole cache with the snapshot at `path`.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let restored = ResponseCache::load(path)?;
        *self.lock()? = restored;
        Ok(())
    }
}
