//! Snapshot persistence for [`ResponseCache`].
//!
//! A snapshot is a single JSON document holding both limits and every entry in
//! insertion order. Payloads are base64-encoded; creation times are Unix milliseconds.

use super::entry::CacheEntry;
use super::key::RequestKey;
use super::store::ResponseCache;
use crate::{Error, ErrorContext, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tracing::info;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    size_limit: Option<u64>,
    time_limit_ms: Option<u64>,
    entries: Vec<SnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    key: RequestKey,
    status: u16,
    url: String,
    payload: String,
    created_at_ms: u64,
}

impl SnapshotEntry {
    fn from_entry(entry: &CacheEntry) -> Self {
        let created_at_ms = entry
            .created_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            key: entry.key.clone(),
            status: entry.status,
            url: entry.url.clone(),
            payload: STANDARD.encode(&entry.payload),
            created_at_ms,
        }
    }

    fn into_entry(self) -> Result<CacheEntry> {
        let payload = STANDARD.decode(self.payload.as_bytes()).map_err(|e| {
            Error::configuration_with_context(
                "corrupt cache snapshot payload",
                ErrorContext::new()
                    .with_details(format!("{}: {}", self.key, e))
                    .with_source("cache_snapshot"),
            )
        })?;
        Ok(CacheEntry::restored(
            self.key,
            Bytes::from(payload),
            self.status,
            self.url,
            UNIX_EPOCH + Duration::from_millis(self.created_at_ms),
        ))
    }
}

impl ResponseCache {
    /// Write all entries plus limits to `path`.
    ///
    /// The snapshot is written to a sibling temp file first and renamed into place.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            size_limit: self.size_limit(),
            time_limit_ms: self
                .time_limit()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            entries: self.entries().map(SnapshotEntry::from_entry).collect(),
        };

        let tmp = temp_path(path);
        let written = write_snapshot(&tmp, &snapshot)
            .and_then(|()| std::fs::rename(&tmp, path).map_err(Error::from));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        info!(
            path = %path.display(),
            entries = snapshot.entries.len(),
            bytes = self.current_size_bytes(),
            "saved response cache"
        );
        Ok(())
    }

    /// Restore a cache from `path`.
    ///
    /// The time limit is always unlimited after loading: restored entries have no reliable
    /// age. Callers may set a new one afterwards.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let snapshot: Snapshot = {
            let reader = BufReader::new(File::open(path)?);
            serde_json::from_reader(reader)?
        };

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::configuration_with_context(
                format!("unsupported cache snapshot version {}", snapshot.version),
                ErrorContext::new()
                    .with_field_path("version")
                    .with_details(format!("expected {}", SNAPSHOT_VERSION))
                    .with_source("cache_snapshot"),
            ));
        }

        let mut cache = ResponseCache::new(snapshot.size_limit, None);
        for entry in snapshot.entries {
            cache.insert_entry(entry.into_entry()?);
        }

        info!(
            path = %path.display(),
            entries = cache.len(),
            bytes = cache.current_size_bytes(),
            "loaded response cache"
        );
        Ok(cache)
    }
}

/// `cache.json` -> `cache.json.tmp`, so snapshots sharing a stem never share a temp file.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("cache"));
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_snapshot(tmp: &Path, snapshot: &Snapshot) -> Result<()> {
    let mut writer = BufWriter::new(File::create(tmp)?);
    serde_json::to_writer(&mut writer, snapshot)?;
    writer.flush()?;
    Ok(())
}
