use crate::cache::{ResponseCache, SharedCache};
use crate::client::core::CatmaidInstance;
use crate::config::SessionConfig;
use crate::fetch::WorkerPool;
use crate::transport::{HttpTransport, RemoteEndpoint, TransportConfig};
use crate::Result;
use arc_swap::ArcSwap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`CatmaidInstance`].
///
/// Without an explicit [`endpoint`](Self::endpoint) the session talks HTTP through
/// [`HttpTransport`] using the server and credentials given here.
pub struct InstanceBuilder {
    config: SessionConfig,
    transport: TransportConfig,
    endpoint: Option<Arc<dyn RemoteEndpoint>>,
    cache: Option<ResponseCache>,
    /// Set through [`InstanceBuilder::time_limit`]; takes precedence over the config's seconds.
    time_limit: Option<Option<Duration>>,
}

impl InstanceBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            transport: TransportConfig::default(),
            endpoint: None,
            cache: None,
            time_limit: None,
        }
    }

    /// Start from [`SessionConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Ok(Self::new().config(SessionConfig::from_env()?))
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self.time_limit = None;
        self
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.transport.server = Some(server.into());
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.transport.api_token = Some(token.into());
        self
    }

    pub fn http_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.transport.http_user = Some(user.into());
        self.transport.http_password = Some(password.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.transport.timeout = Some(timeout);
        self
    }

    /// Use a custom endpoint instead of HTTP (tests, proxies, recorded fixtures).
    pub fn endpoint(mut self, endpoint: Arc<dyn RemoteEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn caching(mut self, enabled: bool) -> Self {
        self.config.caching = enabled;
        self
    }

    pub fn size_limit_mb(mut self, mb: Option<u64>) -> Self {
        self.config.size_limit_mb = mb;
        self
    }

    pub fn time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.max_workers = n;
        self
    }

    pub fn large_batch_warning(mut self, threshold: usize) -> Self {
        self.config.large_batch_warning = threshold;
        self
    }

    /// Start from an existing cache (e.g. one restored with [`ResponseCache::load`]).
    /// Its own limits are kept.
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<CatmaidInstance> {
        self.config.validate()?;

        let endpoint: Arc<dyn RemoteEndpoint> = match self.endpoint {
            Some(e) => e,
            None => Arc::new(HttpTransport::new(self.transport)?),
        };

        let pool = WorkerPool::new(self.config.max_workers)?;
        let time_limit = self
            .time_limit
            .unwrap_or_else(|| self.config.time_limit());
        let cache = self
            .cache
            .unwrap_or_else(|| ResponseCache::new(self.config.size_limit_bytes(), time_limit));

        Ok(CatmaidInstance {
            endpoint,
            cache: SharedCache::new(cache),
            caching: AtomicBool::new(self.config.caching),
            pool: ArcSwap::from_pointee(pool),
            large_batch_warning: self.config.large_batch_warning,
            warned_large_batch: AtomicBool::new(false),
        })
    }
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FormBody;
    use crate::transport::{Attachment, Response, TransportError};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl RemoteEndpoint for Echo {
        async fn get(&self, url: &str) -> std::result::Result<Response, TransportError> {
            Ok(Response::new(200, url, "{}"))
        }
        async fn post(
            &self,
            url: &str,
            _: &FormBody,
            _: &[Attachment],
        ) -> std::result::Result<Response, TransportError> {
            Ok(Response::new(200, url, "{}"))
        }
    }

    #[test]
    fn test_time_limit_is_kept_exactly() {
        let rm = InstanceBuilder::new()
            .endpoint(Arc::new(Echo))
            .time_limit(Some(Duration::MAX))
            .build()
            .unwrap();
        assert_eq!(rm.cache().lock().unwrap().time_limit(), Some(Duration::MAX));

        let rm = InstanceBuilder::new()
            .endpoint(Arc::new(Echo))
            .time_limit(Some(Duration::from_millis(1500)))
            .build()
            .unwrap();
        assert_eq!(
            rm.cache().lock().unwrap().time_limit(),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_config_time_limit_applies_without_override() {
        let config = SessionConfig {
            time_limit_secs: Some(30.0),
            ..SessionConfig::default()
        };
        let rm = InstanceBuilder::new()
            .time_limit(None)
            .config(config)
            .endpoint(Arc::new(Echo))
            .build()
            .unwrap();
        assert_eq!(
            rm.cache().lock().unwrap().time_limit(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_out_of_range_config_time_limit_fails_build() {
        let config = SessionConfig {
            time_limit_secs: Some(1e20),
            ..SessionConfig::default()
        };
        let err = InstanceBuilder::new()
            .config(config)
            .endpoint(Arc::new(Echo))
            .build()
            .unwrap_err();
        assert!(matches!(err, crate::Error::Configuration { .. }));
    }
}
