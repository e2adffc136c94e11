//! Error taxonomy.
//!
//! Per-item errors (`GenerationError`, `DeliveryError`) are isolated to the job
//! they belong to. `SourceFetchError` degrades into next-tick backoff.
//! `StoreError::InvalidTransition` is a contract violation and always surfaces.

use thiserror::Error;

use crate::domain::{JobId, JobStatus};

/// Maximum length of collaborator-provided text kept in logs and `last_error`.
pub const MAX_REASON_LEN: usize = 500;

/// Cut long error text down to [`MAX_REASON_LEN`] characters.
pub fn truncate_reason(reason: &str) -> String {
    if reason.chars().count() <= MAX_REASON_LEN {
        return reason.to_string();
    }
    let head: String = reason.chars().take(MAX_REASON_LEN).collect();
    format!("{head}... [truncated]")
}

#[derive(Debug, Error)]
#[error("source fetch failed: {0}")]
pub struct SourceFetchError(pub String);

#[derive(Debug, Error)]
#[error("content generation failed: {0}")]
pub struct GenerationError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("webhook call timed out")]
    Timeout,

    #[error("webhook responded with status {0}")]
    Status(u16),

    #[error("webhook transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Short label for the `error_type` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Timeout => "timeout",
            DeliveryError::Status(_) => "status",
            DeliveryError::Transport(_) => "transport",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A single record could not be decoded; it has been quarantined.
    #[error("corrupt record {id}: {reason}")]
    Corruption { id: String, reason: String },

    #[error("invalid transition for job {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("unknown job {0}")]
    UnknownJob(JobId),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
