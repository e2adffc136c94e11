//! Notifier - webhook delivery with bounded retry.
//!
//! One call to [`Notifier::deliver`] is one attempt. Failed attempts are
//! recorded on the job with `next_retry_at`; the poller calls again once it
//! is due. Delivery is at-least-once: a crash between a 2xx and the store
//! write re-sends the payload, and the receiver dedups on `job_details.id`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::app::metrics::{API_WEBHOOK, Metrics};
use crate::domain::{DeliveryAttempt, FailureReason, Job, JobStatus, WebhookPayload, qualifies};
use crate::error::{DeliveryError, StoreError, truncate_reason};
use crate::ports::{Clock, WebhookSender};
use crate::retry::BackoffPolicy;
use crate::store::JobStore;

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub threshold: f64,
    pub search_query: String,
    pub timeout: Duration,
}

/// What one `deliver` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered,
    RetryScheduled { next_retry_at: DateTime<Utc> },
    Exhausted,
    /// The previous failure's backoff has not elapsed; nothing was sent.
    NotDue { next_retry_at: DateTime<Utc> },
}

pub struct Notifier {
    store: Arc<JobStore>,
    sender: Arc<dyn WebhookSender>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    settings: NotifierSettings,
}

impl Notifier {
    pub fn new(
        store: Arc<JobStore>,
        sender: Arc<dyn WebhookSender>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        settings: NotifierSettings,
    ) -> Self {
        Self {
            store,
            sender,
            clock,
            metrics,
            settings,
        }
    }

    pub fn settings(&self) -> &NotifierSettings {
        &self.settings
    }

    /// Make one delivery attempt for a Processed, qualifying job.
    ///
    /// Anything else is rejected with `InvalidTransition` before a request
    /// is sent.
    pub async fn deliver(&self, job: &Job) -> Result<DeliveryOutcome, StoreError> {
        let qualifying = job.score.is_some_and(|s| qualifies(s, self.settings.threshold));
        if job.status != JobStatus::Processed || !qualifying {
            return Err(StoreError::InvalidTransition {
                id: job.id.clone(),
                from: job.status,
                to: JobStatus::Delivered,
            });
        }

        let now = self.clock.now();
        if let Some(next_retry_at) = job.next_retry_at
            && next_retry_at > now
        {
            return Ok(DeliveryOutcome::NotDue { next_retry_at });
        }

        let attempt_number = job.delivery_attempts() + 1;
        let payload = WebhookPayload::for_job(job, &self.settings.search_query, now);

        self.metrics.delivery_attempts.inc();
        let started = Instant::now();
        let result = match tokio::time::timeout(self.settings.timeout, self.sender.send(&payload)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout),
        };
        self.metrics.observe_call(
            API_WEBHOOK,
            started.elapsed(),
            result.as_ref().err().map(DeliveryError::kind),
        );

        let mut job = job.clone();
        match result {
            Ok(()) => {
                job.mark_delivered(DeliveryAttempt::success(attempt_number, now))?;
                self.store.update(job.clone())?;
                self.metrics.jobs_delivered.inc();
                tracing::info!(job_id = %job.id, attempt = attempt_number, "job delivered");
                Ok(DeliveryOutcome::Delivered)
            }
            Err(err) => {
                let reason = truncate_reason(&err.to_string());
                if attempt_number >= self.settings.max_attempts {
                    job.record_failed_delivery(DeliveryAttempt::failure(
                        attempt_number,
                        now,
                        reason.clone(),
                        None,
                    ))?;
                    job.fail(FailureReason::DeliveryExhausted, reason.clone())?;
                    self.store.update(job.clone())?;
                    self.metrics.jobs_failed.inc();
                    tracing::error!(
                        job_id = %job.id,
                        attempts = attempt_number,
                        reason = %reason,
                        "delivery exhausted"
                    );
                    return Ok(DeliveryOutcome::Exhausted);
                }

                let delay = self.settings.backoff.next_delay(attempt_number);
                let next_retry_at = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                job.record_failed_delivery(DeliveryAttempt::failure(
                    attempt_number,
                    now,
                    reason.clone(),
                    Some(next_retry_at),
                ))?;
                self.store.update(job.clone())?;
                tracing::warn!(
                    job_id = %job.id,
                    attempt = attempt_number,
                    reason = %reason,
                    next_retry_at = %next_retry_at,
                    "delivery failed, retry scheduled"
                );
                Ok(DeliveryOutcome::RetryScheduled { next_retry_at })
            }
        }
    }
}
