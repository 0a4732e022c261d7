//! Bounded worker pool for in-flight requests.

use crate::{Error, ErrorContext, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Default number of concurrent requests per session.
pub const DEFAULT_MAX_WORKERS: usize = 100;

/// Caps how many submitted futures run at once.
///
/// Each submission becomes a tokio task that waits for a permit before running, so
/// submitting never blocks. A pool is fixed in size; resizing means building a new pool.
/// Tasks already submitted keep the old pool's permits.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::configuration_with_context(
                "max_workers must be at least 1",
                ErrorContext::new()
                    .with_field_path("max_workers")
                    .with_source("worker_pool"),
            ));
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of submitted tasks currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.size.saturating_sub(self.permits.available_permits())
    }

    pub fn submit<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            // The semaphore is never closed.
            let _permit = permits.acquire_owned().await.ok();
            fut.await
        })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_WORKERS)),
            size: DEFAULT_MAX_WORKERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(Error::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(3).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    i
                })
            })
            .collect();

        let results: Vec<usize> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results, (0..20).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        assert_eq!(pool.in_flight(), 0);
    }
}
