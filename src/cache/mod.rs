//! # Response Caching Module
//!
//! Caches remote responses keyed by request identity so repeated requests in a
//! session are served without touching the network.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RequestKey`] | Canonical identity of a request (method, URL, sorted form fields) |
//! | [`CacheEntry`] | One cached response with its size and creation time |
//! | [`ResponseCache`] | Ordered store with a byte budget and an age limit |
//! | [`SharedCache`] | Mutex-guarded cache shared between concurrent batches |
//! | [`CacheStats`] | Hit/miss/eviction counters |
//!
//! ## Eviction
//!
//! - **Size**: inserting evicts the oldest-inserted entries until the new entry fits.
//!   An entry larger than the whole budget is not cached at all.
//! - **Age**: a lookup that finds an entry older than the time limit removes it and
//!   reports a miss.
//!
//! ```rust
//! use catmaid_fetch::cache::{RequestKey, ResponseCache};
//! use bytes::Bytes;
//!
//! let mut cache = ResponseCache::new(Some(16), None);
//! cache.insert(RequestKey::get("https://x/a"), Bytes::from(vec![0u8; 16]), 200, "https://x/a");
//! cache.insert(RequestKey::get("https://x/b"), Bytes::from(vec![0u8; 16]), 200, "https://x/b");
//! assert_eq!(cache.len(), 1);
//! assert!(cache.lookup(&RequestKey::get("https://x/a")).is_none());
//! ```
//!
//! Snapshots ([`ResponseCache::save`] / [`ResponseCache::load`]) keep entries and limits,
//! except that a loaded cache always starts without a time limit.

mod entry;
mod key;
mod persist;
mod shared;
mod store;

pub use entry::CacheEntry;
pub use key::{FormBody, Method, RequestKey};
pub use shared::SharedCache;
pub use store::{CacheStats, ResponseCache, DEFAULT_SIZE_LIMIT_MB};

pub(crate) use store::BYTES_PER_MB;
