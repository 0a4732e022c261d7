//! Optional process-wide default session.
//!
//! Code that wants to omit an explicit instance can register one here and look it up
//! with [`resolve`]. Nothing in the fetch or cache layers reads this.

use crate::client::CatmaidInstance;
use crate::{Error, ErrorContext, Result};
use arc_swap::ArcSwapOption;
use once_cell::sync::Lazy;
use std::sync::Arc;

static DEFAULT: Lazy<ArcSwapOption<CatmaidInstance>> = Lazy::new(|| ArcSwapOption::empty());

/// Register `instance` as the default; returns the previous one.
pub fn set_default(instance: Arc<CatmaidInstance>) -> Option<Arc<CatmaidInstance>> {
    DEFAULT.swap(Some(instance))
}

pub fn default_instance() -> Option<Arc<CatmaidInstance>> {
    DEFAULT.load_full()
}

pub fn clear_default() -> Option<Arc<CatmaidInstance>> {
    DEFAULT.swap(None)
}

/// `explicit` if given, else the registered default.
pub fn resolve(explicit: Option<&Arc<CatmaidInstance>>) -> Result<Arc<CatmaidInstance>> {
    if let Some(instance) = explicit {
        return Ok(Arc::clone(instance));
    }
    default_instance().ok_or_else(|| {
        Error::configuration_with_context(
            "no CATMAID instance given and no default instance set",
            ErrorContext::new().with_source("global"),
        )
    })
}
