//! Inspection cache: per content hash, the results every scanner produced.
//!
//! One JSON document per hash under the cache directory. A record from
//! another tool version, or older than the expiry window, is discarded and
//! recomputed. A record that does not parse, or claims a different hash
//! than its file name, is deleted and logged as a security event.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warden_logging::{SecurityEvent, SecurityEventLogger};

use crate::error::{AnalysisError, Result};
use crate::verdict::ScanResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionCache {
    pub creation_timestamp: DateTime<Utc>,
    pub tool_version: String,
    pub content_hash: String,
    pub results: BTreeMap<String, ScanResult>,
}

impl InspectionCache {
    pub fn new(content_hash: &str, tool_version: &str, now: DateTime<Utc>) -> Self {
        Self {
            creation_timestamp: now,
            tool_version: tool_version.to_string(),
            content_hash: content_hash.to_string(),
            results: BTreeMap::new(),
        }
    }
}

/// Why a stored record was not reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMiss {
    Absent,
    VersionMismatch(String),
    Expired,
    Corrupt(String),
}

pub struct CacheStore {
    dir: PathBuf,
    expiry: Duration,
    tool_version: String,
    /// Serializes writes to the cache directory.
    write_lock: Mutex<()>,
}

fn is_hex_digest(hash: &str) -> bool {
    !hash.is_empty() && hash.len() <= 128 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, expiry_days: u32, tool_version: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            expiry: Duration::days(i64::from(expiry_days)),
            tool_version: tool_version.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, content_hash: &str) -> PathBuf {
        self.dir.join(format!("{content_hash}.json"))
    }

    /// Load the record for `content_hash`, or a fresh empty one with the reason
    /// the stored record (if any) was not used.
    pub fn load(&self, content_hash: &str, now: DateTime<Utc>) -> (InspectionCache, Option<CacheMiss>) {
        match self.read(content_hash, now) {
            Ok(cache) => (cache, None),
            Err(miss) => {
                match &miss {
                    CacheMiss::Absent => debug!(hash = %content_hash, "[Cache] No inspection cache"),
                    CacheMiss::VersionMismatch(v) => {
                        info!(hash = %content_hash, cached_version = %v, "[Cache] Discarding cache from another version")
                    }
                    CacheMiss::Expired => info!(hash = %content_hash, "[Cache] Discarding expired cache"),
                    CacheMiss::Corrupt(reason) => self.discard_corrupt(content_hash, reason),
                }
                (InspectionCache::new(content_hash, &self.tool_version, now), Some(miss))
            }
        }
    }

    fn read(&self, content_hash: &str, now: DateTime<Utc>) -> std::result::Result<InspectionCache, CacheMiss> {
        if !is_hex_digest(content_hash) {
            return Err(CacheMiss::Absent);
        }
        let path = self.path_for(content_hash);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(CacheMiss::Absent),
            Err(e) => return Err(CacheMiss::Corrupt(e.to_string())),
        };
        let cache: InspectionCache =
            serde_json::from_slice(&raw).map_err(|e| CacheMiss::Corrupt(e.to_string()))?;
        if cache.content_hash != content_hash {
            return Err(CacheMiss::Corrupt(format!(
                "record claims hash {}",
                cache.content_hash
            )));
        }
        if cache.tool_version != self.tool_version {
            return Err(CacheMiss::VersionMismatch(cache.tool_version));
        }
        if cache.creation_timestamp > now {
            return Err(CacheMiss::Corrupt(format!(
                "created in the future ({})",
                cache.creation_timestamp
            )));
        }
        if now.signed_duration_since(cache.creation_timestamp) > self.expiry {
            return Err(CacheMiss::Expired);
        }
        Ok(cache)
    }

    fn discard_corrupt(&self, content_hash: &str, reason: &str) {
        let path = self.path_for(content_hash);
        warn!(hash = %content_hash, reason = %reason, "[Cache] Deleting corrupt inspection cache");
        SecurityEventLogger::log(SecurityEvent::CacheCorruption {
            content_hash: content_hash.to_string(),
            path: path.display().to_string(),
            reason: reason.to_string(),
        });
        let _guard = self.write_lock.lock();
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "[Cache] Could not delete corrupt cache");
            }
        }
    }

    /// Write a record atomically (temp file, then rename).
    pub fn persist(&self, cache: &InspectionCache) -> Result<()> {
        if !is_hex_digest(&cache.content_hash) {
            return Err(AnalysisError::io(
                &self.dir,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "content hash is not hex"),
            ));
        }
        let json = serde_json::to_vec_pretty(cache).map_err(|source| AnalysisError::Serialize {
            what: "inspection cache",
            source,
        })?;
        let path = self.path_for(&cache.content_hash);
        let tmp = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.dir).map_err(|e| AnalysisError::io(&self.dir, e))?;
        fs::write(&tmp, json).map_err(|e| AnalysisError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| AnalysisError::io(&path, e))?;
        debug!(path = %path.display(), results = cache.results.len(), "[Cache] Persisted");
        Ok(())
    }

    pub fn remove(&self, content_hash: &str) -> Result<bool> {
        let path = self.path_for(content_hash);
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AnalysisError::io(path, e)),
        }
    }

    /// Delete every cache record. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(AnalysisError::io(&self.dir, e)),
        };
        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(|e| AnalysisError::io(&self.dir, e))?.path();
            let is_record = path
                .extension()
                .is_some_and(|ext| ext == "json" || ext == "tmp");
            if is_record {
                fs::remove_file(&path).map_err(|e| AnalysisError::io(&path, e))?;
                removed += 1;
            }
        }
        info!(dir = %self.dir.display(), removed, "[Cache] Cleared inspection caches");
        Ok(removed)
    }
}
