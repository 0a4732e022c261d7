//! A single cached response.

use super::key::RequestKey;
use bytes::Bytes;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub payload: Bytes,
    pub status: u16,
    /// Effective URL the response came from (after redirects).
    pub url: String,
    /// Fixed at insertion; never recomputed.
    pub size_bytes: u64,
    pub created_at: SystemTime,
}

impl CacheEntry {
    pub fn new(key: RequestKey, payload: Bytes, status: u16, url: impl Into<String>) -> Self {
        Self::restored(key, payload, status, url, SystemTime::now())
    }

    pub(crate) fn restored(
        key: RequestKey,
        payload: Bytes,
        status: u16,
        url: impl Into<String>,
        created_at: SystemTime,
    ) -> Self {
        let size_bytes = payload.len() as u64;
        Self {
            key,
            payload,
            status,
            url: url.into(),
            size_bytes,
            created_at,
        }
    }

    /// Age of the entry. A clock that moved backwards reads as zero age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed().unwrap_or_default()
    }

    pub fn is_expired(&self, time_limit: Option<Duration>) -> bool {
        match time_limit {
            Some(limit) => self.age() > limit,
            None => false,
        }
    }
}
