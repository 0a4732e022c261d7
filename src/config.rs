//! Session configuration.
//!
//! Defaults can be overridden from the environment:
//! - `CATMAID_CACHING` (`1`/`0`/`true`/`false`)
//! - `CATMAID_CACHE_SIZE_MB` (`none` for unlimited)
//! - `CATMAID_CACHE_TIME_LIMIT_SECS` (`none` for unlimited)
//! - `CATMAID_MAX_WORKERS`
//! - `CATMAID_LARGE_BATCH_WARNING`

use crate::cache::{BYTES_PER_MB, DEFAULT_SIZE_LIMIT_MB};
use crate::fetch::DEFAULT_MAX_WORKERS;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Batches larger than this (with caching on) log a one-time warning.
pub const DEFAULT_LARGE_BATCH_WARNING: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub caching: bool,
    /// Cache budget in megabytes; `None` is unlimited.
    pub size_limit_mb: Option<u64>,
    /// Maximum entry age in seconds; `None` is unlimited.
    pub time_limit_secs: Option<f64>,
    pub max_workers: usize,
    pub large_batch_warning: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            caching: true,
            size_limit_mb: Some(DEFAULT_SIZE_LIMIT_MB),
            time_limit_secs: None,
            max_workers: DEFAULT_MAX_WORKERS,
            large_batch_warning: DEFAULT_LARGE_BATCH_WARNING,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with `CATMAID_*` environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Read a YAML file. Missing fields take their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_yaml::from_str(&text).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid session config: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("session_config"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (an env-like getter).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CATMAID_CACHING") {
            self.caching = parse_bool("CATMAID_CACHING", &v)?;
        }
        if let Some(v) = lookup("CATMAID_CACHE_SIZE_MB") {
            self.size_limit_mb = parse_limit("CATMAID_CACHE_SIZE_MB", &v)?;
        }
        if let Some(v) = lookup("CATMAID_CACHE_TIME_LIMIT_SECS") {
            self.time_limit_secs = parse_limit("CATMAID_CACHE_TIME_LIMIT_SECS", &v)?;
        }
        if let Some(v) = lookup("CATMAID_MAX_WORKERS") {
            self.max_workers = parse_value("CATMAID_MAX_WORKERS", &v)?;
        }
        if let Some(v) = lookup("CATMAID_LARGE_BATCH_WARNING") {
            self.large_batch_warning = parse_value("CATMAID_LARGE_BATCH_WARNING", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::configuration_with_context(
                "max_workers must be at least 1",
                ErrorContext::new()
                    .with_field_path("max_workers")
                    .with_source("session_config"),
            ));
        }
        if let Some(secs) = self.time_limit_secs {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(Error::configuration_with_context(
                    "time_limit_secs must be a non-negative number of seconds within Duration range",
                    ErrorContext::new()
                        .with_field_path("time_limit_secs")
                        .with_details(secs.to_string())
                        .with_source("session_config"),
                ));
            }
        }
        Ok(())
    }

    pub fn size_limit_bytes(&self) -> Option<u64> {
        self.size_limit_mb.map(|mb| mb.saturating_mul(BYTES_PER_MB))
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

fn invalid(name: &str, value: &str) -> Error {
    Error::configuration_with_context(
        format!("invalid value for {}", name),
        ErrorContext::new()
            .with_field_path(name)
            .with_details(value.to_string())
            .with_source("session_config"),
    )
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| invalid(name, raw))
}

fn parse_limit<T: FromStr>(name: &str, raw: &str) -> Result<Option<T>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "none" | "unlimited" => Ok(None),
        _ => parse_value(name, raw).map(Some),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = SessionConfig::default();
        assert!(cfg.caching);
        assert_eq!(cfg.size_limit_mb, Some(128));
        assert_eq!(cfg.size_limit_bytes(), Some(128 * 1024 * 1024));
        assert_eq!(cfg.time_limit(), None);
        assert_eq!(cfg.max_workers, 100);
    }

    #[test]
    fn test_env_overrides() {
        let cfg = SessionConfig::default()
            .with_overrides(env(&[
                ("CATMAID_CACHING", "false"),
                ("CATMAID_CACHE_SIZE_MB", "none"),
                ("CATMAID_CACHE_TIME_LIMIT_SECS", "90"),
                ("CATMAID_MAX_WORKERS", "8"),
            ]))
            .unwrap();
        assert!(!cfg.caching);
        assert_eq!(cfg.size_limit_mb, None);
        assert_eq!(cfg.time_limit(), Some(Duration::from_secs(90)));
        assert_eq!(cfg.max_workers, 8);
    }

    #[test]
    fn test_invalid_env_values_are_rejected() {
        let err = SessionConfig::default()
            .with_overrides(env(&[("CATMAID_MAX_WORKERS", "lots")]))
            .unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("CATMAID_MAX_WORKERS")
        );

        assert!(SessionConfig::default()
            .with_overrides(env(&[("CATMAID_MAX_WORKERS", "0")]))
            .is_err());
        assert!(SessionConfig::default()
            .with_overrides(env(&[("CATMAID_CACHING", "maybe")]))
            .is_err());
    }

    #[test]
    fn test_negative_time_limit_is_invalid() {
        let cfg = SessionConfig {
            time_limit_secs: Some(-1.0),
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_out_of_range_time_limit_is_invalid() {
        let err = SessionConfig::default()
            .with_overrides(env(&[("CATMAID_CACHE_TIME_LIMIT_SECS", "1e20")]))
            .unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("time_limit_secs")
        );

        let cfg = SessionConfig {
            time_limit_secs: Some(f64::INFINITY),
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());
        // Unvalidated configs never panic on conversion.
        assert_eq!(cfg.time_limit(), None);
    }

    #[test]
    fn test_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.yaml");
        std::fs::write(&path, "caching: true\nsize_limit_mb: 16\nmax_workers: 4\n").unwrap();

        let cfg = SessionConfig::from_yaml_file(&path).unwrap();
        assert_eq!(cfg.size_limit_mb, Some(16));
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.large_batch_warning, DEFAULT_LARGE_BATCH_WARNING);

        std::fs::write(&path, "max_workers: [1, 2]\n").unwrap();
        assert!(matches!(
            SessionConfig::from_yaml_file(&path),
            Err(Error::Configuration { .. })
        ));
    }
}
