//! Job record and lifecycle.
//!
//! Lifecycle:
//! - Seen -> Scoring -> Processed -> Delivered
//! - Seen -> Scoring -> Processed -> Skipped (below threshold, nothing to send)
//! - Seen -> Scoring -> Failed -> Scoring (bounded generation retry)
//! - Processed -> Failed (delivery exhausted, terminal)
//!
//! Transitions go through methods on [`Job`]; the store re-checks them
//! against the persisted status before writing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attempt::DeliveryAttempt;
use super::ids::JobId;
use super::outcome::GeneratedContent;
use crate::error::StoreError;

/// A listing as the job source returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawJob {
    pub id: JobId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub job_type: String,
    #[serde(default)]
    pub experience_level: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub rate: String,
    #[serde(default)]
    pub client_info: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Recorded, not yet scored.
    Seen,

    /// Content generator call in flight.
    Scoring,

    /// Scored and content generated; gate not yet applied or delivery pending.
    Processed,

    /// Generation failed, got stuck, or delivery was exhausted.
    Failed,

    /// Webhook accepted the payload.
    Delivered,

    /// Processed but below the threshold; no notification due.
    #[serde(rename = "delivered_skipped")]
    Skipped,
}

impl JobStatus {
    /// Is `next` reachable from `self` in one step?
    ///
    /// `Processed -> Processed` is allowed so failed delivery attempts can be
    /// recorded without leaving the state.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Seen, Scoring)
                | (Scoring, Processed)
                | (Scoring, Failed)
                | (Processed, Processed)
                | (Processed, Delivered)
                | (Processed, Skipped)
                | (Processed, Failed)
                | (Failed, Scoring)
        )
    }

    /// Never purged, regardless of age.
    pub fn is_in_flight(self) -> bool {
        matches!(self, JobStatus::Seen | JobStatus::Scoring)
    }
}

/// Why a job ended up in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The content generator errored, timed out, or produced no score.
    Generation(String),

    /// Left in `Scoring` past the stuck-job timeout.
    Stuck,

    /// Webhook delivery hit `max_delivery_attempts`.
    DeliveryExhausted,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Generation(_) => "generation",
            FailureReason::Stuck => "stuck",
            FailureReason::DeliveryExhausted => "delivery_exhausted",
        }
    }

    /// Delivery exhaustion is never retried automatically.
    pub fn allows_retry(&self) -> bool {
        !matches!(self, FailureReason::DeliveryExhausted)
    }
}

/// One discovered listing tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub title: String,
    pub description: String,
    pub job_type: String,
    pub experience_level: String,
    pub duration: String,
    pub rate: String,
    pub client_info: String,
    pub url: String,
    pub discovered_at: DateTime<Utc>,

    /// Insertion order; breaks ties between jobs discovered in the same tick.
    #[serde(default)]
    pub seq: u64,

    pub status: JobStatus,

    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub cover_letter: Option<String>,
    #[serde(default)]
    pub interview_script: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,

    /// Set on entry to `Scoring`, used for stuck detection.
    #[serde(default)]
    pub scoring_started_at: Option<DateTime<Utc>>,

    /// Number of times this job entered `Scoring`.
    #[serde(default)]
    pub generation_attempts: u32,

    #[serde(default)]
    pub failure: Option<FailureReason>,
    #[serde(default)]
    pub last_error: Option<String>,

    /// Earliest time the next delivery attempt may run.
    #[serde(default)]
    pub next_retry_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub attempts: Vec<DeliveryAttempt>,
}

impl Job {
    pub fn from_raw(raw: RawJob, discovered_at: DateTime<Utc>, seq: u64) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            description: raw.description,
            job_type: raw.job_type,
            experience_level: raw.experience_level,
            duration: raw.duration,
            rate: raw.rate,
            client_info: raw.client_info,
            url: raw.url,
            discovered_at,
            seq,
            status: JobStatus::Seen,
            score: None,
            cover_letter: None,
            interview_script: None,
            processed_at: None,
            scoring_started_at: None,
            generation_attempts: 0,
            failure: None,
            last_error: None,
            next_retry_at: None,
            attempts: Vec::new(),
        }
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), StoreError> {
        if !self.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Seen/Failed -> Scoring. Clears the previous attempt's score.
    pub fn begin_scoring(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.transition(JobStatus::Scoring)?;
        self.generation_attempts += 1;
        self.scoring_started_at = Some(now);
        self.score = None;
        self.failure = None;
        Ok(())
    }

    /// Scoring -> Processed.
    pub fn complete(
        &mut self,
        content: GeneratedContent,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.transition(JobStatus::Processed)?;
        self.score = Some(content.score);
        self.cover_letter = Some(content.cover_letter);
        self.interview_script = Some(content.interview_script);
        self.processed_at = Some(now);
        self.scoring_started_at = None;
        self.last_error = None;
        Ok(())
    }

    /// -> Failed with `reason`.
    pub fn fail(&mut self, reason: FailureReason, error: String) -> Result<(), StoreError> {
        self.transition(JobStatus::Failed)?;
        self.failure = Some(reason);
        self.last_error = Some(error);
        self.scoring_started_at = None;
        self.next_retry_at = None;
        Ok(())
    }

    /// Processed -> Skipped.
    pub fn skip(&mut self) -> Result<(), StoreError> {
        self.transition(JobStatus::Skipped)
    }

    /// Append a failed delivery attempt; the job stays Processed.
    pub fn record_failed_delivery(&mut self, attempt: DeliveryAttempt) -> Result<(), StoreError> {
        self.transition(JobStatus::Processed)?;
        self.next_retry_at = attempt.next_retry_at;
        if let super::AttemptOutcome::Failure(reason) = &attempt.outcome {
            self.last_error = Some(reason.clone());
        }
        self.attempts.push(attempt);
        Ok(())
    }

    /// Append the successful attempt and move to Delivered.
    pub fn mark_delivered(&mut self, attempt: DeliveryAttempt) -> Result<(), StoreError> {
        self.transition(JobStatus::Delivered)?;
        self.next_retry_at = None;
        self.attempts.push(attempt);
        Ok(())
    }

    pub fn delivery_attempts(&self) -> u32 {
        self.attempts.len() as u32
    }

    pub fn has_successful_delivery(&self) -> bool {
        self.attempts.iter().any(|a| a.outcome.is_success())
    }

    /// Failed but eligible for another generation attempt.
    pub fn is_retryable(&self, max_generation_attempts: u32) -> bool {
        self.status == JobStatus::Failed
            && self.failure.as_ref().is_some_and(FailureReason::allows_retry)
            && self.generation_attempts < max_generation_attempts
    }

    /// No further automatic transition will happen.
    pub fn is_terminal(&self, max_generation_attempts: u32) -> bool {
        match self.status {
            JobStatus::Delivered | JobStatus::Skipped => true,
            JobStatus::Failed => !self.is_retryable(max_generation_attempts),
            _ => false,
        }
    }

    /// Processed and its next delivery step is due (first attempt, or retry time passed).
    pub fn is_delivery_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processed && self.next_retry_at.is_none_or(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AttemptOutcome;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    fn job() -> Job {
        let raw = RawJob {
            id: JobId::new("J1"),
            title: "Rust developer".into(),
            description: "Build a poller".into(),
            job_type: "Hourly".into(),
            experience_level: "Expert".into(),
            duration: "1-3 months".into(),
            rate: "$60/hr".into(),
            client_info: "Verified".into(),
            url: "https://example.com/J1".into(),
        };
        Job::from_raw(raw, at(0), 0)
    }

    #[test]
    fn new_job_starts_as_seen() {
        let j = job();
        assert_eq!(j.status, JobStatus::Seen);
        assert_eq!(j.delivery_attempts(), 0);
        assert_eq!(j.generation_attempts, 0);
    }

    #[test]
    fn happy_path_to_delivered() {
        let mut j = job();
        j.begin_scoring(at(1)).unwrap();
        assert_eq!(j.scoring_started_at, Some(at(1)));
        j.complete(GeneratedContent::new(8.5, "X", "Y"), at(2)).unwrap();
        assert_eq!(j.score, Some(8.5));
        assert_eq!(j.processed_at, Some(at(2)));
        j.mark_delivered(DeliveryAttempt::success(1, at(3))).unwrap();
        assert_eq!(j.status, JobStatus::Delivered);
        assert!(j.has_successful_delivery());
        assert!(j.is_terminal(3));
    }

    #[rstest]
    #[case::seen_to_processed(JobStatus::Seen, JobStatus::Processed)]
    #[case::seen_to_delivered(JobStatus::Seen, JobStatus::Delivered)]
    #[case::scoring_to_delivered(JobStatus::Scoring, JobStatus::Delivered)]
    #[case::delivered_to_scoring(JobStatus::Delivered, JobStatus::Scoring)]
    #[case::skipped_to_delivered(JobStatus::Skipped, JobStatus::Delivered)]
    #[case::failed_to_delivered(JobStatus::Failed, JobStatus::Delivered)]
    #[case::processed_to_seen(JobStatus::Processed, JobStatus::Seen)]
    fn rejects_invalid_transitions(#[case] from: JobStatus, #[case] to: JobStatus) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn invalid_transition_reports_both_states() {
        let mut j = job();
        let err = j.skip().unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition { from: JobStatus::Seen, to: JobStatus::Skipped, .. }
        ));
        assert_eq!(j.status, JobStatus::Seen);
    }

    #[test]
    fn generation_failure_is_retryable_until_budget_spent() {
        let mut j = job();
        for attempt in 1..=3 {
            j.begin_scoring(at(attempt)).unwrap();
            j.fail(FailureReason::Generation("boom".into()), "boom".into())
                .unwrap();
            assert_eq!(j.is_retryable(3), attempt < 3);
        }
        assert!(j.is_terminal(3));
    }

    #[test]
    fn delivery_exhausted_is_never_retryable() {
        let mut j = job();
        j.begin_scoring(at(1)).unwrap();
        j.complete(GeneratedContent::new(9.0, "", ""), at(1)).unwrap();
        j.fail(FailureReason::DeliveryExhausted, "502".into()).unwrap();
        assert!(!j.is_retryable(10));
        assert!(j.is_terminal(10));
    }

    #[test]
    fn failed_delivery_keeps_processed_and_schedules_retry() {
        let mut j = job();
        j.begin_scoring(at(1)).unwrap();
        j.complete(GeneratedContent::new(9.0, "", ""), at(1)).unwrap();
        assert!(j.is_delivery_due(at(1)));

        j.record_failed_delivery(DeliveryAttempt::failure(1, at(1), "timeout", Some(at(3))))
            .unwrap();
        assert_eq!(j.status, JobStatus::Processed);
        assert_eq!(j.last_error.as_deref(), Some("timeout"));
        assert!(!j.is_delivery_due(at(2)));
        assert!(j.is_delivery_due(at(3)));
        assert_eq!(j.attempts[0].outcome, AttemptOutcome::Failure("timeout".into()));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Skipped).unwrap(),
            "\"delivered_skipped\""
        );
        assert_eq!(serde_json::to_string(&JobStatus::Seen).unwrap(), "\"seen\"");
    }
}
