//! # Batch Fetching
//!
//! Turns a list of requests into an ordered list of results, serving what it can from
//! the cache and sending the rest through a bounded [`WorkerPool`].
//!
//! ## Stages
//!
//! 1. **Normalize**: one URL becomes a list of one; a single body or file list is
//!    repeated for every URL. Length mismatches fail before any network call.
//! 2. **Partition**: each request is a cache hit or a miss. Requests with files are
//!    always misses.
//! 3. **Dispatch**: every miss goes to the [`RemoteEndpoint`](crate::transport::RemoteEndpoint)
//!    through the pool (GET without a body, POST with one).
//! 4. **Await & order**: results are reassembled in request order.
//! 5. **Validate**: non-2xx statuses and transport failures become [`RequestFailure`]s.
//! 6. **Write back**: every fetched response of a file-less request is cached,
//!    whatever its status.
//! 7. **React**: [`ErrorPolicy`] decides between raising a [`BatchError`], logging, or
//!    ignoring the failures.
//! 8. **Decode**: as JSON, raw bytes or the responses themselves ([`ReturnType`]).
//! 9. **Collapse**: a single-URL call returns [`FetchOutput::One`].

mod batch;
mod orchestrator;
mod pool;
mod validate;

pub use batch::{Batch, Request};
pub use orchestrator::{ErrorPolicy, FetchOptions, FetchOrchestrator, FetchOutput, Fetched, ReturnType};
pub use pool::{WorkerPool, DEFAULT_MAX_WORKERS};
pub use validate::{BatchError, FailureKind, RequestFailure};
