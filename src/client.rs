//! Client session for a CATMAID server.
//!
//! Keep the public surface small: build a [`CatmaidInstance`], call `fetch` (or one of
//! its JSON helpers), manage the cache through the same handle.

pub mod builder;
pub mod core;

pub use builder::InstanceBuilder;
pub use core::{CachingGuard, CatmaidInstance};
