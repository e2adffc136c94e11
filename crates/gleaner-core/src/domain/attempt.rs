//! Delivery attempt history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one webhook call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    Success,
    Failure(String),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

/// One Notifier attempt for a job.
///
/// Records are append-only and live inside the owning [`Job`](super::Job);
/// the job's delivery attempt count is the length of that list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// 1-indexed.
    pub attempt_number: u32,
    pub attempted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,

    /// When the next attempt becomes due. `None` after success or exhaustion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl DeliveryAttempt {
    pub fn success(attempt_number: u32, attempted_at: DateTime<Utc>) -> Self {
        Self {
            attempt_number,
            attempted_at,
            outcome: AttemptOutcome::Success,
            next_retry_at: None,
        }
    }

    pub fn failure(
        attempt_number: u32,
        attempted_at: DateTime<Utc>,
        reason: impl Into<String>,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            attempt_number,
            attempted_at,
            outcome: AttemptOutcome::Failure(reason.into()),
            next_retry_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_with_reason() {
        let s = serde_json::to_string(&AttemptOutcome::Failure("502".into())).unwrap();
        assert_eq!(s, r#"{"kind":"FAILURE","reason":"502"}"#);

        let s = serde_json::to_string(&AttemptOutcome::Success).unwrap();
        assert_eq!(s, r#"{"kind":"SUCCESS"}"#);
    }
}
