//! Request identity used as the cache lookup key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// POST form fields.
///
/// Fields are kept sorted by name, so two bodies built from the same pairs in a different
/// order compare and hash equal. Inserting a field twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormBody(BTreeMap<String, String>);

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.0.insert(name.into(), value.to_string());
    }

    /// Add a list-valued field the way CATMAID expects it (`name[0]`, `name[1]`, ...).
    pub fn with_list<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        for (i, v) in values.into_iter().enumerate() {
            self.insert(format!("{}[{}]", name, i), v);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Fields in canonical (name-sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for FormBody {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut body = FormBody::new();
        for (k, v) in iter {
            body.insert(k, v);
        }
        body
    }
}

/// Canonical identity of an outbound request: method, full URL (query included) and
/// the sorted form fields. Attachments are never part of the identity; requests that
/// carry files bypass the cache altogether.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: Method,
    pub url: String,
    pub body: FormBody,
}

impl RequestKey {
    /// A missing body canonicalizes to the same empty fingerprint as an empty one.
    pub fn new(method: Method, url: impl Into<String>, body: Option<&FormBody>) -> Self {
        Self {
            method,
            url: url.into(),
            body: body.cloned().unwrap_or_default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url, None)
    }

    pub fn post(url: impl Into<String>, body: &FormBody) -> Self {
        Self::new(Method::Post, url, Some(body))
    }

    /// Stable SHA-256 over the canonical form. Used for log correlation.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.url.as_bytes());
        for (k, v) in self.body.iter() {
            hasher.update(b"\n");
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.body.is_empty() {
            write!(f, "{} {}", self.method, self.url)
        } else {
            write!(
                f,
                "{} {} ({} fields, {})",
                self.method,
                self.url,
                self.body.len(),
                &self.digest()[..12]
            )
        }
    }
}
