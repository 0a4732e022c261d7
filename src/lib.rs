//! # catmaid-fetch
//!
//! Cached, concurrent request layer for CATMAID API clients.
//!
//! ## Overview
//!
//! A [`CatmaidInstance`] issues batches of GET/POST requests against a CATMAID server.
//! Each batch is answered from a size- and age-bounded response cache where possible;
//! the remaining requests run concurrently through a bounded worker pool. Results always
//! come back in request order, and HTTP failures across the batch are handled by one
//! [`ErrorPolicy`].
//!
//! What a response *means* is up to the caller: payloads are JSON values, raw bytes or
//! whole responses.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use catmaid_fetch::{CatmaidInstance, ErrorPolicy, FetchOptions};
//! use catmaid_fetch::fetch::Batch;
//!
//! #[tokio::main]
//! async fn main() -> catmaid_fetch::Result<()> {
//!     let rm = CatmaidInstance::builder()
//!         .server("https://catmaid.example.org")
//!         .api_token("your-api-token")
//!         .max_workers(20)
//!         .build()?;
//!
//!     let urls = vec![
//!         "1/skeletons/16/compact-detail",
//!         "1/skeletons/42/compact-detail",
//!     ];
//!     let out = rm
//!         .fetch(Batch::many(urls), &FetchOptions::new().on_error(ErrorPolicy::Log))
//!         .await?;
//!     println!("{} results, {} bytes cached", out.len(), rm.cache_size_bytes()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Request keys, the response cache and its snapshots |
//! | [`fetch`] | Batch normalization, worker pool, status validation, orchestration |
//! | [`transport`] | Remote endpoint trait and the reqwest implementation |
//! | [`client`] | The session handle and its builder |
//! | [`config`] | Session configuration (defaults, env, YAML) |
//! | [`global`] | Optional process-wide default session |

pub mod cache;
pub mod client;
pub mod config;
pub mod fetch;
pub mod global;
pub mod transport;

pub use client::{CatmaidInstance, InstanceBuilder};
pub use config::SessionConfig;
pub use fetch::{ErrorPolicy, FetchOptions, FetchOutput, Fetched, ReturnType};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
