//! The batch fetch protocol: partition, dispatch, reorder, validate, write back, decode.

use super::batch::{Batch, Request};
use super::pool::WorkerPool;
use super::validate::{classify, BatchError, RequestFailure};
use crate::cache::{CacheEntry, RequestKey, SharedCache};
use crate::transport::{RemoteEndpoint, Response, TransportError};
use crate::{Error, Result};
use bytes::Bytes;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

type Outcome = std::result::Result<Response, TransportError>;

/// What to do when requests in a batch come back with a non-2xx status or a
/// transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort the batch with one [`BatchError`] listing every failure.
    #[default]
    Raise,
    /// Log each failure and carry on decoding.
    Log,
    /// Carry on decoding silently.
    Pass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnType {
    /// Parse every payload as JSON. A parse failure is always fatal.
    #[default]
    Json,
    /// Payload bytes as received.
    Raw,
    /// The resolved [`Response`] objects.
    Response,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub on_error: ErrorPolicy,
    pub return_type: ReturnType,
    /// Override the session's caching switch for this call only.
    pub caching: Option<bool>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    pub fn return_type(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn caching(mut self, enabled: bool) -> Self {
        self.caching = Some(enabled);
        self
    }
}

/// One decoded result.
#[derive(Debug)]
pub enum Fetched {
    Json(Value),
    Raw(Bytes),
    /// A transport failure that was let through by `Log`/`Pass` shows up as `Err`.
    Response(Outcome),
}

impl Fetched {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Fetched::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Fetched::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_raw(self) -> Option<Bytes> {
        match self {
            Fetched::Raw(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Outcome> {
        match self {
            Fetched::Response(r) => Some(r),
            _ => None,
        }
    }
}

/// Result of a fetch call: a single item when one URL was requested, a list otherwise.
#[derive(Debug)]
pub enum FetchOutput {
    One(Fetched),
    Many(Vec<Fetched>),
}

impl FetchOutput {
    pub fn into_vec(self) -> Vec<Fetched> {
        match self {
            FetchOutput::One(f) => vec![f],
            FetchOutput::Many(v) => v,
        }
    }

    pub fn into_one(self) -> Option<Fetched> {
        match self {
            FetchOutput::One(f) => Some(f),
            FetchOutput::Many(v) if v.len() == 1 => v.into_iter().next(),
            FetchOutput::Many(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FetchOutput::One(_) => 1,
            FetchOutput::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs one batch against an endpoint, a worker pool and (optionally) a cache.
///
/// The orchestrator itself holds no state between calls.
pub struct FetchOrchestrator<'a> {
    endpoint: Arc<dyn RemoteEndpoint>,
    pool: Arc<WorkerPool>,
    cache: Option<&'a SharedCache>,
    large_batch: Option<(usize, &'a AtomicBool)>,
}

impl<'a> FetchOrchestrator<'a> {
    pub fn new(endpoint: Arc<dyn RemoteEndpoint>, pool: Arc<WorkerPool>) -> Self {
        Self {
            endpoint,
            pool,
            cache: None,
            large_batch: None,
        }
    }

    pub fn with_cache(mut self, cache: &'a SharedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Warn once (per `warned` flag) when a cached batch has more than `threshold` requests.
    pub fn with_large_batch_warning(mut self, threshold: usize, warned: &'a AtomicBool) -> Self {
        self.large_batch = Some((threshold, warned));
        self
    }

    pub async fn fetch(&self, batch: Batch, options: &FetchOptions) -> Result<FetchOutput> {
        let (requests, single) = batch.normalize()?;
        let n = requests.len();
        self.warn_if_large(n);

        let keys: Vec<Option<RequestKey>> = match self.cache {
            Some(_) => requests.iter().map(Request::cache_key).collect(),
            None => vec![None; n],
        };

        let mut slots: Vec<Option<Outcome>> = self.partition(&keys)?;

        // Dispatch every miss. Hits never reach the endpoint.
        let mut misses = Vec::new();
        let mut handles = Vec::new();
        for (i, req) in requests.iter().enumerate() {
            if slots[i].is_some() {
                continue;
            }
            let endpoint = Arc::clone(&self.endpoint);
            let req = req.clone();
            misses.push(i);
            handles.push(self.pool.submit(async move { req.send(endpoint.as_ref()).await }));
        }
        debug!(
            total = n,
            hits = n - misses.len(),
            misses = misses.len(),
            "dispatched batch"
        );

        for (&i, joined) in misses.iter().zip(futures::future::join_all(handles).await) {
            slots[i] = Some(joined.unwrap_or_else(|e| Err(TransportError::Worker(e.to_string()))));
        }

        let failures: Vec<RequestFailure> = misses
            .iter()
            .filter_map(|&i| {
                slots[i]
                    .as_ref()
                    .and_then(|outcome| classify(i, &requests[i].url, outcome))
            })
            .collect();

        // Write back before the error policy can abort: failed siblings never undo
        // successful inserts.
        self.write_back(&keys, &misses, &slots)?;

        match options.on_error {
            ErrorPolicy::Raise if !failures.is_empty() => {
                return Err(BatchError::new(failures).into());
            }
            ErrorPolicy::Log => {
                for f in &failures {
                    error!(
                        index = f.index,
                        url = %f.url,
                        status = ?f.status,
                        detail = f.detail.as_deref().unwrap_or(""),
                        "{}",
                        f.message
                    );
                }
            }
            _ => {}
        }

        let mut decoded = Vec::with_capacity(n);
        for (i, slot) in slots.into_iter().enumerate() {
            let outcome = slot.unwrap_or_else(|| {
                Err(TransportError::Worker("batch result missing".to_string()))
            });
            decoded.push(decode(i, &requests[i].url, outcome, options.return_type)?);
        }

        if single {
            if let Some(item) = decoded.pop() {
                return Ok(FetchOutput::One(item));
            }
        }
        Ok(FetchOutput::Many(decoded))
    }

    /// Returns whether the advisory was emitted by this call.
    fn warn_if_large(&self, n: usize) -> bool {
        if self.cache.is_none() {
            return false;
        }
        match self.large_batch {
            Some((threshold, warned)) if n > threshold && !warned.swap(true, Ordering::Relaxed) => {
                warn!(
                    requests = n,
                    threshold,
                    "large batch with caching enabled; cache bookkeeping may slow this down"
                );
                true
            }
            _ => false,
        }
    }

    /// Tag each index with its cached response, if any.
    fn partition(&self, keys: &[Option<RequestKey>]) -> Result<Vec<Option<Outcome>>> {
        let mut slots: Vec<Option<Outcome>> = keys.iter().map(|_| None).collect();
        let Some(cache) = self.cache else {
            return Ok(slots);
        };

        let mut cache = cache.lock()?;
        for (slot, key) in slots.iter_mut().zip(keys) {
            let Some(key) = key else { continue };
            if let Some(entry) = cache.lookup(key) {
                *slot = Some(Ok(cached_response(entry)));
            }
        }
        Ok(slots)
    }

    fn write_back(
        &self,
        keys: &[Option<RequestKey>],
        misses: &[usize],
        slots: &[Option<Outcome>],
    ) -> Result<()> {
        let Some(cache) = self.cache else {
            return Ok(());
        };

        let mut cache = cache.lock()?;
        for &i in misses {
            if let (Some(key), Some(Ok(resp))) = (&keys[i], &slots[i]) {
                cache.insert(key.clone(), resp.payload.clone(), resp.status, resp.url.clone());
            }
        }
        Ok(())
    }
}

fn cached_response(entry: &CacheEntry) -> Response {
    let mut resp = Response::new(entry.status, entry.url.clone(), entry.payload.clone());
    resp.is_cached = true;
    resp
}

fn decode(index: usize, url: &str, outcome: Outcome, return_type: ReturnType) -> Result<Fetched> {
    match return_type {
        ReturnType::Response => Ok(Fetched::Response(outcome)),
        ReturnType::Raw => Ok(Fetched::Raw(
            outcome.map(|r| r.payload).unwrap_or_default(),
        )),
        ReturnType::Json => {
            let payload = outcome.map(|r| r.payload).unwrap_or_default();
            serde_json::from_slice(&payload)
                .map(Fetched::Json)
                .map_err(|source| Error::Decode {
                    index,
                    url: url.to_string(),
                    source,
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FormBody;
    use crate::transport::Attachment;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl RemoteEndpoint for Echo {
        async fn get(&self, url: &str) -> std::result::Result<Response, TransportError> {
            Ok(Response::new(200, url, "[]"))
        }
        async fn post(
            &self,
            url: &str,
            _: &FormBody,
            _: &[Attachment],
        ) -> std::result::Result<Response, TransportError> {
            Ok(Response::new(200, url, "[]"))
        }
    }

    fn batch(n: usize) -> Batch {
        Batch::many((0..n).map(|i| format!("https://x/{}", i)))
    }

    #[tokio::test]
    async fn test_large_batch_warning_fires_once() {
        let cache = SharedCache::default();
        let warned = AtomicBool::new(false);
        let orchestrator = FetchOrchestrator::new(Arc::new(Echo), Arc::new(WorkerPool::default()))
            .with_cache(&cache)
            .with_large_batch_warning(3, &warned);

        assert!(!orchestrator.warn_if_large(3));
        orchestrator.fetch(batch(3), &FetchOptions::default()).await.unwrap();
        assert!(!warned.load(Ordering::Relaxed));

        orchestrator.fetch(batch(5), &FetchOptions::default()).await.unwrap();
        assert!(warned.load(Ordering::Relaxed));

        let out = orchestrator.fetch(batch(6), &FetchOptions::default()).await.unwrap();
        assert_eq!(out.len(), 6);
        assert!(!orchestrator.warn_if_large(6));
        assert!(!orchestrator.warn_if_large(100));
    }

    #[test]
    fn test_large_batch_warning_flag_flips_on_first_oversized_batch() {
        let cache = SharedCache::default();
        let warned = AtomicBool::new(false);
        let orchestrator = FetchOrchestrator::new(Arc::new(Echo), Arc::new(WorkerPool::default()))
            .with_cache(&cache)
            .with_large_batch_warning(3, &warned);

        let emitted: Vec<bool> = [2, 4, 5, 3, 9]
            .iter()
            .map(|&n| orchestrator.warn_if_large(n))
            .collect();
        assert_eq!(emitted, vec![false, true, false, false, false]);
    }

    #[tokio::test]
    async fn test_large_batch_without_cache_never_warns() {
        let warned = AtomicBool::new(false);
        let orchestrator = FetchOrchestrator::new(Arc::new(Echo), Arc::new(WorkerPool::default()))
            .with_large_batch_warning(3, &warned);

        let out = orchestrator.fetch(batch(10), &FetchOptions::default()).await.unwrap();
        assert_eq!(out.len(), 10);
        assert!(!orchestrator.warn_if_large(10));
        assert!(!warned.load(Ordering::Relaxed));
    }

    #[test]
    fn test_decode_json_failure_is_fatal() {
        let err = decode(
            4,
            "https://x/a",
            Ok(Response::new(500, "https://x/a", "<html>")),
            ReturnType::Json,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Decode { index: 4, .. }));
    }

    #[test]
    fn test_decode_transport_failure_as_raw_is_empty() {
        let out = decode(
            0,
            "u",
            Err(TransportError::Other("refused".into())),
            ReturnType::Raw,
        )
        .unwrap();
        assert_eq!(out.into_raw(), Some(Bytes::new()));
    }

    #[test]
    fn test_decode_transport_failure_as_response_keeps_error() {
        let out = decode(
            0,
            "u",
            Err(TransportError::Other("refused".into())),
            ReturnType::Response,
        )
        .unwrap();
        assert!(matches!(out.into_response(), Some(Err(TransportError::Other(_)))));
    }

    #[test]
    fn test_cached_response_is_flagged() {
        let entry = CacheEntry::new(
            RequestKey::get("https://x/a"),
            Bytes::from_static(b"[]"),
            404,
            "https://x/a",
        );
        let resp = cached_response(&entry);
        assert!(resp.is_cached);
        assert_eq!(resp.status, 404);
        assert_eq!(resp.reason(), "Not Found");
    }

    #[test]
    fn test_output_collapse_helpers() {
        let one = FetchOutput::One(Fetched::Json(Value::Null));
        assert_eq!(one.len(), 1);
        assert!(one.into_one().is_some());

        let many = FetchOutput::Many(vec![Fetched::Raw(Bytes::new()), Fetched::Raw(Bytes::new())]);
        assert!(many.into_one().is_none());
    }
}
