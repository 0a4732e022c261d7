//! Remote endpoint abstraction.
//!
//! The fetch layer only needs to submit a GET or a form POST and read back status,
//! effective URL and body bytes. [`HttpTransport`] is the reqwest-backed implementation;
//! tests plug in their own [`RemoteEndpoint`].

mod http;

pub use http::{HttpTransport, TransportConfig};

use crate::cache::FormBody;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;

/// A file attached to a POST as a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub field: String,
    pub file_name: String,
    pub mime: Option<String>,
    pub data: Bytes,
}

impl Attachment {
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            mime: None,
            data: data.into(),
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// A resolved HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    /// Reason phrase, when the transport knows one.
    pub reason: Option<String>,
    /// Effective URL after redirects.
    pub url: String,
    pub headers: HeaderMap,
    pub payload: Bytes,
    /// Set on responses served from the cache. Informational only.
    pub is_cached: bool,
}

impl Response {
    pub fn new(status: u16, url: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            status,
            reason: reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map(str::to_string),
            url: url.into(),
            headers: HeaderMap::new(),
            payload: payload.into(),
            is_cached: false,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("Unknown")
    }
}

#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    async fn get(&self, url: &str) -> Result<Response, TransportError>;

    async fn post(
        &self,
        url: &str,
        form: &FormBody,
        files: &[Attachment],
    ) -> Result<Response, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Http(e) if e.is_timeout())
    }
}
