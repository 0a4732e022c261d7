//! Batch input shape and normalization.

use crate::cache::{FormBody, Method, RequestKey};
use crate::transport::{Attachment, RemoteEndpoint, Response, TransportError};
use crate::{Error, Result};

/// Per-request value that may be given once for the whole batch or once per URL.
#[derive(Debug, Clone)]
enum PerRequest<T> {
    Absent,
    Broadcast(T),
    Each(Vec<T>),
}

impl<T: Clone + Default> PerRequest<T> {
    fn expand(self, field: &'static str, n: usize) -> Result<Vec<T>> {
        match self {
            PerRequest::Absent => Ok(vec![T::default(); n]),
            PerRequest::Broadcast(v) => Ok(vec![v; n]),
            PerRequest::Each(v) if v.len() == n => Ok(v),
            PerRequest::Each(v) => Err(Error::InvalidBatchShape {
                field,
                urls: n,
                given: v.len(),
            }),
        }
    }
}

/// One fetch call: a single URL or a list, with optional bodies and attachments.
///
/// ```rust
/// use catmaid_fetch::cache::FormBody;
/// use catmaid_fetch::fetch::Batch;
///
/// let batch = Batch::many(vec!["https://x/1/a", "https://x/1/b"])
///     .body(FormBody::new().with("with_tags", true));
/// let (requests, single) = batch.normalize().unwrap();
/// assert_eq!(requests.len(), 2);
/// assert!(!single);
/// ```
#[derive(Debug, Clone)]
pub struct Batch {
    urls: Vec<String>,
    single: bool,
    bodies: PerRequest<Option<FormBody>>,
    files: PerRequest<Vec<Attachment>>,
}

impl Batch {
    /// A single-URL call; the result collapses to one item.
    pub fn one(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            single: true,
            bodies: PerRequest::Absent,
            files: PerRequest::Absent,
        }
    }

    pub fn many<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            single: false,
            bodies: PerRequest::Absent,
            files: PerRequest::Absent,
        }
    }

    /// Same form body for every URL.
    pub fn body(mut self, body: FormBody) -> Self {
        self.bodies = PerRequest::Broadcast(Some(body));
        self
    }

    /// One body per URL; `None` entries are sent as GET.
    pub fn bodies(mut self, bodies: Vec<Option<FormBody>>) -> Self {
        self.bodies = PerRequest::Each(bodies);
        self
    }

    /// Same attachments for every URL.
    pub fn files(mut self, files: Vec<Attachment>) -> Self {
        self.files = PerRequest::Broadcast(files);
        self
    }

    pub fn files_each(mut self, files: Vec<Vec<Attachment>>) -> Self {
        self.files = PerRequest::Each(files);
        self
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Expand into one [`Request`] per URL.
    ///
    /// Returns the requests and whether the caller asked for a single URL. Fails
    /// with [`Error::InvalidBatchShape`] when per-request lists don't match the URLs.
    pub fn normalize(self) -> Result<(Vec<Request>, bool)> {
        let n = self.urls.len();
        let bodies = self.bodies.expand("bodies", n)?;
        let files = self.files.expand("file lists", n)?;

        let requests = self
            .urls
            .into_iter()
            .zip(bodies)
            .zip(files)
            .map(|((url, body), files)| Request { url, body, files })
            .collect();
        Ok((requests, self.single))
    }
}

impl From<&str> for Batch {
    fn from(url: &str) -> Self {
        Batch::one(url)
    }
}

impl From<String> for Batch {
    fn from(url: String) -> Self {
        Batch::one(url)
    }
}

impl From<Vec<String>> for Batch {
    fn from(urls: Vec<String>) -> Self {
        Batch::many(urls)
    }
}

impl From<Vec<&str>> for Batch {
    fn from(urls: Vec<&str>) -> Self {
        Batch::many(urls)
    }
}

/// A single normalized request.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub body: Option<FormBody>,
    pub files: Vec<Attachment>,
}

impl Request {
    /// POST when there is a non-empty body or any attachment, GET otherwise.
    pub fn method(&self) -> Method {
        let has_body = self.body.as_ref().is_some_and(|b| !b.is_empty());
        if has_body || self.has_files() {
            Method::Post
        } else {
            Method::Get
        }
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    /// Cache identity. `None` for requests carrying files, which are never cached.
    pub fn cache_key(&self) -> Option<RequestKey> {
        if self.has_files() {
            return None;
        }
        Some(RequestKey::new(self.method(), self.url.clone(), self.body.as_ref()))
    }

    pub(crate) async fn send(
        &self,
        endpoint: &dyn RemoteEndpoint,
    ) -> std::result::Result<Response, TransportError> {
        match self.method() {
            Method::Get => endpoint.get(&self.url).await,
            Method::Post => {
                let empty = FormBody::new();
                let body = self.body.as_ref().unwrap_or(&empty);
                endpoint.post(&self.url, body, &self.files).await
            }
        }
    }
}
