//! Crash-atomic file persistence shared by the job store and the content cache.
//!
//! Writes go to `<file>.tmp`, are fsynced, then renamed over the target, so a
//! reader or a restarted process sees either the old or the new document.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `bytes` atomically.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp = tmp_path(path);
    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(&tmp, e));
    }

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::io(path, e)
    })
}

/// Read the whole file, `None` if it does not exist yet.
pub(crate) fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// A record that failed to decode, kept aside for operator inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct QuarantinedRecord {
    pub raw: serde_json::Value,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

/// Sibling file holding quarantined records: `jobs.json` -> `jobs.quarantine.json`.
pub(crate) fn quarantine_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    path.with_file_name(format!("{stem}.quarantine.json"))
}

/// Merge `records` into the quarantine file next to `path`.
pub(crate) fn quarantine(
    path: &Path,
    records: BTreeMap<String, QuarantinedRecord>,
) -> Result<(), StoreError> {
    if records.is_empty() {
        return Ok(());
    }
    let qpath = quarantine_path(path);
    let mut existing: BTreeMap<String, QuarantinedRecord> = match read_optional(&qpath)? {
        Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %qpath.display(), error = %e, "quarantine file unreadable, starting a new one");
            BTreeMap::new()
        }),
        None => BTreeMap::new(),
    };
    existing.extend(records);
    let bytes = serde_json::to_vec_pretty(&existing)?;
    write_atomic(&qpath, &bytes)
}
