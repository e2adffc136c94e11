//! Content cache: fingerprint-keyed blobs with a TTL.
//!
//! Purely a cost optimization. Expired entries read as absent, a missing or
//! unreadable cache file starts empty, and every miss is safe to treat as
//! "fetch fresh".

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::app::metrics::Metrics;
use crate::error::StoreError;
use crate::ports::Clock;
use crate::store::{read_optional, write_atomic};

/// Deterministic cache key over `parts`.
///
/// Each part is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content: String,
    pub fetched_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::seconds(self.ttl_seconds.min(i64::MAX as u64) as i64);
        match self.fetched_at.checked_add_signed(ttl) {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

pub struct ContentCache {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ContentCache {
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        let path = path.into();
        let entries = match read_optional(&path) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "cache file unreadable, starting empty");
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "cache file could not be read, starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            clock,
            metrics,
            entries: RwLock::new(entries),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Content for `fingerprint`, or `None` if never written or expired.
    pub fn get(&self, fingerprint: &str) -> Option<String> {
        let now = self.clock.now();
        let hit = self
            .read()
            .get(fingerprint)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.content.clone());
        match hit {
            Some(_) => self.metrics.cache_hits.inc(),
            None => self.metrics.cache_misses.inc(),
        }
        hit
    }

    /// Store `content` under `fingerprint`, overwriting any previous entry.
    pub fn put(
        &self,
        fingerprint: &str,
        content: impl Into<String>,
        ttl: std::time::Duration,
    ) -> Result<(), StoreError> {
        let entry = CacheEntry {
            content: content.into(),
            fetched_at: self.clock.now(),
            ttl_seconds: ttl.as_secs(),
        };
        let mut entries = self.write();
        let mut next = entries.clone();
        next.insert(fingerprint.to_string(), entry);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    pub fn get_json<T: DeserializeOwned>(&self, fingerprint: &str) -> Option<T> {
        let raw = self.get(fingerprint)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(fingerprint, error = %e, "cached content did not decode, ignoring");
                None
            }
        }
    }

    pub fn put_json<T: Serialize>(
        &self,
        fingerprint: &str,
        value: &T,
        ttl: std::time::Duration,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.put(fingerprint, raw, ttl)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn evict_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut entries = self.write();
        let before = entries.len();
        let next: HashMap<String, CacheEntry> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let evicted = before - next.len();
        if evicted > 0 {
            self.persist(&next)?;
            *entries = next;
            tracing::debug!(evicted, "evicted expired cache entries");
        }
        Ok(evicted)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(entries)?;
        write_atomic(&self.path, &bytes)
    }
}
