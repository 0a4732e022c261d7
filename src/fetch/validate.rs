//! Status classification for resolved requests.

use crate::transport::{Response, TransportError};
use serde_json::Value;

const NO_ERROR_MESSAGE: &str = "No error message.";
const NO_DETAILS: &str = "No details provided.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused, timeout, DNS, ...
    Transport,
    /// 5xx
    Server,
    /// 4xx
    Client,
    /// Any other non-2xx status.
    Other,
}

/// One failed request in a batch.
#[derive(Debug, Clone)]
pub struct RequestFailure {
    /// Position in the caller's batch.
    pub index: usize,
    pub url: String,
    pub status: Option<u16>,
    pub kind: FailureKind,
    pub message: String,
    pub detail: Option<String>,
}

/// Every HTTP/transport failure of a batch, raised under `ErrorPolicy::Raise`.
#[derive(Debug, Clone)]
pub struct BatchError {
    pub failures: Vec<RequestFailure>,
}

impl BatchError {
    pub fn new(failures: Vec<RequestFailure>) -> Self {
        Self { failures }
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} errors encountered", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n{}", failure.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

/// Classify a resolved request. Returns `None` for 2xx.
pub(crate) fn classify(
    index: usize,
    request_url: &str,
    outcome: &Result<Response, TransportError>,
) -> Option<RequestFailure> {
    let resp = match outcome {
        Ok(resp) => resp,
        Err(e) => {
            return Some(RequestFailure {
                index,
                url: request_url.to_string(),
                status: None,
                kind: FailureKind::Transport,
                message: format!("Transport Error: {} for url: {}", e, request_url),
                detail: None,
            })
        }
    };

    if resp.is_success() {
        return None;
    }

    let status = resp.status;
    let (kind, message, detail) = match status {
        500..=599 => {
            let (error, detail) = server_error_fields(&resp.payload);
            (
                FailureKind::Server,
                format!("{} Server Error: {} for url: {}", status, error, resp.url),
                Some(detail),
            )
        }
        400..=499 => (
            FailureKind::Client,
            format!("{} Client Error: {} for url: {}", status, resp.reason(), resp.url),
            None,
        ),
        _ => (
            FailureKind::Other,
            format!("{} HTTP Error: {} for url: {}", status, resp.reason(), resp.url),
            None,
        ),
    };

    Some(RequestFailure {
        index,
        url: resp.url.clone(),
        status: Some(status),
        kind,
        message,
        detail,
    })
}

/// Best-effort `error`/`detail` extraction from a 5xx body.
fn server_error_fields(payload: &[u8]) -> (String, String) {
    let body: Option<Value> = serde_json::from_slice(payload).ok();
    let field = |name: &str| -> Option<String> {
        match body.as_ref()?.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    };
    (
        field("error").unwrap_or_else(|| NO_ERROR_MESSAGE.to_string()),
        field("detail").unwrap_or_else(|| NO_DETAILS.to_string()),
    )
}
