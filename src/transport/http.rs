use super::{Attachment, RemoteEndpoint, Response, TransportError};
use crate::cache::FormBody;
use crate::Result;
use async_trait::async_trait;
use keyring::Entry;
use reqwest::multipart::{Form, Part};
use reqwest::Proxy;
use std::env;
use std::time::Duration;
use url::Url;

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Base URL; relative request URLs are resolved against it.
    pub server: Option<String>,
    pub api_token: Option<String>,
    pub http_user: Option<String>,
    pub http_password: Option<String>,
    /// Falls back to `CATMAID_HTTP_TIMEOUT_SECS`, then 30s.
    pub timeout: Option<Duration>,
}

impl TransportConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: Some(server.into()),
            ..Self::default()
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_http_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.http_user = Some(user.into());
        self.http_password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// reqwest-backed [`RemoteEndpoint`] speaking to a CATMAID server.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Option<Url>,
    api_token: Option<String>,
    http_user: Option<String>,
    http_password: Option<String>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let base_url = match config.server.as_deref() {
            Some(s) => Some(parse_base_url(s)?),
            None => None,
        };

        let timeout = config.timeout.unwrap_or_else(|| {
            Duration::from_secs(
                env::var("CATMAID_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(30),
            )
        });

        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(
                env::var("CATMAID_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("CATMAID_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| crate::Error::Transport(TransportError::Other(e.to_string())))?;

        let api_token = config
            .api_token
            .or_else(|| Self::lookup_api_token(base_url.as_ref()));

        Ok(Self {
            client,
            base_url,
            api_token,
            http_user: config.http_user,
            http_password: config.http_password,
        })
    }

    fn lookup_api_token(server: Option<&Url>) -> Option<String> {
        // 1. Keyring entry for this server's host
        if let Some(host) = server.and_then(|u| u.host_str()) {
            if let Ok(entry) = Entry::new("catmaid", host) {
                if let Ok(token) = entry.get_password() {
                    return Some(token);
                }
            }
        }

        // 2. Environment
        env::var("CATMAID_API_TOKEN").ok()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Resolve `url` against the server base when it is relative.
    pub fn resolve(&self, url: &str) -> std::result::Result<Url, TransportError> {
        match Url::parse(url) {
            Ok(u) => Ok(u),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base.join(url.trim_start_matches('/')).map_err(|e| {
                    TransportError::InvalidUrl {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }),
                None => Err(TransportError::InvalidUrl {
                    url: url.to_string(),
                    reason: "relative URL and no server configured".to_string(),
                }),
            },
            Err(e) => Err(TransportError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn authorize(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.api_token {
            req = req.header("X-Authorization", format!("Token {}", token));
        }
        if let Some(user) = &self.http_user {
            req = req.basic_auth(user, self.http_password.as_deref());
        }
        req
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
    ) -> std::result::Result<Response, TransportError> {
        let resp = self.authorize(req).send().await?;

        let status = resp.status();
        let url = resp.url().to_string();
        let headers = resp.headers().clone();
        let payload = resp.bytes().await?;

        Ok(Response {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            url,
            headers,
            payload,
            is_cached: false,
        })
    }
}

#[async_trait]
impl RemoteEndpoint for HttpTransport {
    async fn get(&self, url: &str) -> std::result::Result<Response, TransportError> {
        let url = self.resolve(url)?;
        self.send(self.client.get(url)).await
    }

    async fn post(
        &self,
        url: &str,
        form: &FormBody,
        files: &[Attachment],
    ) -> std::result::Result<Response, TransportError> {
        let url = self.resolve(url)?;
        let req = self.client.post(url);

        let req = if files.is_empty() {
            let fields: Vec<(&str, &str)> = form.iter().collect();
            req.form(&fields)
        } else {
            let mut multipart = Form::new();
            for (k, v) in form.iter() {
                multipart = multipart.text(k.to_string(), v.to_string());
            }
            for file in files {
                let mut part = Part::bytes(file.data.to_vec()).file_name(file.file_name.clone());
                if let Some(mime) = &file.mime {
                    part = part.mime_str(mime)?;
                }
                multipart = multipart.part(file.field.clone(), part);
            }
            req.multipart(multipart)
        };

        self.send(req).await
    }
}

fn parse_base_url(server: &str) -> Result<Url> {
    // Without a trailing slash `join` would replace the last path segment.
    let normalized = if server.ends_with('/') {
        server.to_string()
    } else {
        format!("{}/", server)
    };
    Url::parse(&normalized).map_err(|e| {
        crate::Error::configuration_with_context(
            format!("invalid server URL: {}", e),
            crate::ErrorContext::new()
                .with_field_path("server")
                .with_details(server.to_string())
                .with_source("http_transport"),
        )
    })
}
