//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use catmaid_fetch::cache::{FormBody, Method};
use catmaid_fetch::transport::{Attachment, RemoteEndpoint, Response, TransportError};
use catmaid_fetch::CatmaidInstance;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Route {
    Respond {
        status: u16,
        body: String,
        delay: Duration,
    },
    Fail,
}

/// In-process endpoint with scripted answers and call accounting.
///
/// Unscripted URLs answer 200 with `{"url": <url>, "method": ..., "form": {...}}`.
#[derive(Default)]
pub struct FakeEndpoint {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<(Method, String)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.respond_after(url, status, body, Duration::ZERO);
    }

    pub fn respond_after(&self, url: &str, status: u16, body: &str, delay: Duration) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route::Respond {
                status,
                body: body.to_string(),
                delay,
            },
        );
    }

    /// Make `url` fail at the transport level.
    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Fail);
    }

    /// Delay every unscripted URL by `delay`.
    pub fn delay_all(&self, urls: &[String], delay: Duration) {
        for url in urls {
            let body = serde_json::json!({ "url": url }).to_string();
            self.respond_after(url, 200, &body, delay);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, u)| u == url)
            .count()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.calls.lock().unwrap().iter().map(|(m, _)| *m).collect()
    }

    /// Highest number of requests that were in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn answer(
        &self,
        method: Method,
        url: &str,
        form: Option<&FormBody>,
    ) -> Result<Response, TransportError> {
        self.calls.lock().unwrap().push((method, url.to_string()));
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let route = self.routes.lock().unwrap().get(url).cloned();
        let result = match route {
            Some(Route::Respond {
                status,
                body,
                delay,
            }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(Response::new(status, url, body))
            }
            Some(Route::Fail) => Err(TransportError::Other("connection refused".to_string())),
            None => {
                let form: HashMap<&str, &str> =
                    form.map(|f| f.iter().collect()).unwrap_or_default();
                let body = serde_json::json!({
                    "url": url,
                    "method": method.as_str(),
                    "form": form,
                });
                Ok(Response::new(200, url, body.to_string()))
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl RemoteEndpoint for FakeEndpoint {
    async fn get(&self, url: &str) -> Result<Response, TransportError> {
        self.answer(Method::Get, url, None).await
    }

    async fn post(
        &self,
        url: &str,
        form: &FormBody,
        _files: &[Attachment],
    ) -> Result<Response, TransportError> {
        self.answer(Method::Post, url, Some(form)).await
    }
}

/// Session wired to `endpoint` with an unlimited cache.
pub fn instance(endpoint: &Arc<FakeEndpoint>) -> CatmaidInstance {
    CatmaidInstance::builder()
        .endpoint(endpoint.clone())
        .size_limit_mb(None)
        .build()
        .expect("failed to build instance")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("catmaid_fetch=debug")
        .try_init();
}
