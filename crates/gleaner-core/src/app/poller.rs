//! Poller - the single scheduler.
//!
//! One tick:
//! 1. reload the store, fail jobs stuck in Scoring
//! 2. fetch listings, record the unknown ones as Seen
//! 3. settle deliveries that are due, then score pending jobs (bounded per tick)
//! 4. evict expired cache entries, purge old terminal jobs, beat the heartbeat
//!
//! Ticks never overlap and shutdown is only observed between them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::app::breaker::CircuitBreaker;
use crate::app::health::Liveness;
use crate::app::metrics::{API_GENERATOR, API_SOURCE, Metrics};
use crate::app::notifier::{DeliveryOutcome, Notifier};
use crate::cache::ContentCache;
use crate::domain::{FailureReason, GeneratedContent, Job, qualifies};
use crate::error::{GenerationError, SourceFetchError, StoreError, truncate_reason};
use crate::ports::{Clock, ContentGenerator, JobSource};
use crate::retry::BackoffPolicy;
use crate::store::JobStore;

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub search_query: String,
    pub polling_interval: Duration,
    pub max_jobs_per_poll: usize,
    pub retention: chrono::Duration,
    pub threshold: f64,
    pub stuck_timeout: Duration,
    pub request_timeout: Duration,
    pub poll_backoff_max: Duration,
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub fetched: usize,
    pub new_jobs: usize,
    pub scored: usize,
    pub generation_failures: usize,
    pub delivered: usize,
    pub retries_scheduled: usize,
    pub exhausted: usize,
    pub skipped: usize,
    pub stuck: usize,
    pub evicted: usize,
    pub purged: usize,
    pub fetch_error: Option<String>,
    pub breaker_open: bool,
}

pub struct Poller {
    store: Arc<JobStore>,
    source: Arc<dyn JobSource>,
    generator: Arc<dyn ContentGenerator>,
    notifier: Notifier,
    breaker: CircuitBreaker,
    cache: Option<Arc<ContentCache>>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    liveness: Arc<Liveness>,
    profile: String,
    settings: PollerSettings,
    fetch_failures: AtomicU32,
}

impl Poller {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: Arc<JobStore>,
        source: Arc<dyn JobSource>,
        generator: Arc<dyn ContentGenerator>,
        notifier: Notifier,
        breaker: CircuitBreaker,
        cache: Option<Arc<ContentCache>>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        liveness: Arc<Liveness>,
        profile: String,
        settings: PollerSettings,
    ) -> Self {
        Self {
            store,
            source,
            generator,
            notifier,
            breaker,
            cache,
            clock,
            metrics,
            liveness,
            profile,
            settings,
            fetch_failures: AtomicU32::new(0),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Delay before the next tick: the polling interval, doubled per
    /// consecutive fetch failure up to `poll_backoff_max`.
    pub fn next_delay(&self) -> Duration {
        let failures = self.fetch_failures.load(Ordering::Acquire);
        if failures == 0 {
            return self.settings.polling_interval;
        }
        BackoffPolicy::exponential(self.settings.polling_interval, self.settings.poll_backoff_max)
            .next_delay(failures.saturating_add(1))
    }

    /// Run one full fetch -> advance -> cleanup cycle.
    pub async fn tick(&self) -> Result<TickReport, StoreError> {
        let mut report = TickReport::default();
        let now = self.clock.now();

        self.store.reload()?;
        let stuck = self.store.fail_stuck(now, to_chrono(self.settings.stuck_timeout))?;
        report.stuck = stuck.len();
        self.metrics.jobs_failed.inc_by(stuck.len() as u64);

        match self.fetch().await {
            Ok(listings) => {
                self.fetch_failures.store(0, Ordering::Release);
                report.fetched = listings.len();
                for raw in listings {
                    if self.store.is_known(&raw.id) {
                        continue;
                    }
                    let job = self.store.record_seen(raw, now)?;
                    self.metrics.jobs_seen.inc();
                    report.new_jobs += 1;
                    tracing::info!(job_id = %job.id, title = %job.title, "new job discovered");
                }
            }
            Err(e) => {
                let failures = self.fetch_failures.fetch_add(1, Ordering::AcqRel) + 1;
                let reason = truncate_reason(&e.to_string());
                self.metrics.source_fetch_errors.inc();
                tracing::warn!(
                    consecutive_failures = failures,
                    reason = %reason,
                    "listing fetch failed, backing off"
                );
                report.fetch_error = Some(reason);
            }
        }

        let mut budget = self.settings.max_jobs_per_poll;

        for job in self.store.list_delivery_due(now) {
            if budget == 0 {
                break;
            }
            budget -= 1;
            self.settle(job, &mut report).await?;
        }

        for job in self.store.list_pending() {
            if budget == 0 {
                break;
            }
            if !self.breaker.allow() {
                report.breaker_open = true;
                tracing::warn!("content generator circuit open, leaving remaining jobs for a later tick");
                break;
            }
            budget -= 1;
            self.advance(job, &mut report).await?;
        }

        if let Some(cache) = &self.cache {
            match cache.evict_expired() {
                Ok(n) => report.evicted = n,
                Err(e) => tracing::warn!(error = %e, "cache eviction failed"),
            }
        }
        report.purged = self.store.purge_older_than(self.settings.retention, now)?;
        self.metrics
            .jobs_pending
            .set(self.store.list_pending().len() as i64);

        self.liveness.beat(self.clock.now());
        Ok(report)
    }

    async fn fetch(&self) -> Result<Vec<crate::domain::RawJob>, SourceFetchError> {
        let call = self
            .source
            .fetch_listings(&self.settings.search_query, self.settings.max_jobs_per_poll);
        let started = Instant::now();
        let (result, error_type) = match tokio::time::timeout(self.settings.request_timeout, call).await {
            Ok(Ok(listings)) => (Ok(listings), None),
            Ok(Err(e)) => (Err(e), Some("fetch")),
            Err(_) => (
                Err(SourceFetchError(format!(
                    "timed out after {}s",
                    self.settings.request_timeout.as_secs()
                ))),
                Some("timeout"),
            ),
        };
        self.metrics
            .observe_call(API_SOURCE, started.elapsed(), error_type);
        result
    }

    async fn generate(&self, job: &Job) -> Result<GeneratedContent, GenerationError> {
        let call = self.generator.generate(job, &self.profile);
        let started = Instant::now();
        let (result, error_type) = match tokio::time::timeout(self.settings.request_timeout, call).await {
            Ok(Ok(content)) if content.score.is_finite() => (Ok(content), None),
            Ok(Ok(content)) => (
                Err(GenerationError(format!(
                    "generator returned no usable score ({})",
                    content.score
                ))),
                Some("invalid_score"),
            ),
            Ok(Err(e)) => (Err(e), Some("generation")),
            Err(_) => (
                Err(GenerationError(format!(
                    "timed out after {}s",
                    self.settings.request_timeout.as_secs()
                ))),
                Some("timeout"),
            ),
        };
        self.metrics
            .observe_call(API_GENERATOR, started.elapsed(), error_type);
        result
    }

    /// Seen/Failed -> Scoring -> Processed|Failed, then the gate.
    async fn advance(&self, mut job: Job, report: &mut TickReport) -> Result<(), StoreError> {
        job.begin_scoring(self.clock.now())?;
        self.store.update(job.clone())?;
        tracing::debug!(job_id = %job.id, attempt = job.generation_attempts, "scoring job");

        match self.generate(&job).await {
            Ok(content) => {
                self.breaker.record_success();
                job.complete(content, self.clock.now())?;
                self.store.update(job.clone())?;
                self.metrics.jobs_processed.inc();
                report.scored += 1;
                tracing::info!(job_id = %job.id, score = ?job.score, "job scored");
                self.settle(job, report).await
            }
            Err(e) => {
                self.breaker.record_failure();
                let reason = truncate_reason(&e.0);
                job.fail(FailureReason::Generation(reason.clone()), reason.clone())?;
                self.store.update(job.clone())?;
                self.metrics.jobs_failed.inc();
                report.generation_failures += 1;
                if job.is_retryable(self.store.max_generation_attempts()) {
                    tracing::warn!(job_id = %job.id, reason = %reason, "generation failed, will retry");
                } else {
                    tracing::error!(job_id = %job.id, reason = %reason, "generation failed, retries exhausted");
                }
                Ok(())
            }
        }
    }

    /// Apply the gate to a Processed job: deliver it or mark it skipped.
    async fn settle(&self, mut job: Job, report: &mut TickReport) -> Result<(), StoreError> {
        let qualifying = job
            .score
            .is_some_and(|s| qualifies(s, self.settings.threshold));

        if !qualifying {
            job.skip()?;
            self.store.update(job.clone())?;
            report.skipped += 1;
            tracing::info!(job_id = %job.id, score = ?job.score, "below threshold, skipped");
            return Ok(());
        }

        if job.attempts.is_empty() {
            self.metrics.jobs_qualified.inc();
        }
        match self.notifier.deliver(&job).await? {
            DeliveryOutcome::Delivered => report.delivered += 1,
            DeliveryOutcome::RetryScheduled { .. } => report.retries_scheduled += 1,
            DeliveryOutcome::Exhausted => report.exhausted += 1,
            DeliveryOutcome::NotDue { .. } => {}
        }
        Ok(())
    }

    /// Tick until `shutdown` flips to true (or its sender is dropped), then flush the store.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StoreError> {
        tracing::info!(
            interval_secs = self.settings.polling_interval.as_secs(),
            max_jobs = self.settings.max_jobs_per_poll,
            "poller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.tick().await {
                Ok(report) => tracing::info!(
                    new = report.new_jobs,
                    scored = report.scored,
                    delivered = report.delivered,
                    skipped = report.skipped,
                    failed = report.generation_failures + report.exhausted + report.stuck,
                    purged = report.purged,
                    "tick complete"
                ),
                Err(e) => tracing::error!(error = %e, "tick aborted"),
            }

            let delay = self.next_delay();
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.store.flush()?;
        tracing::info!("poller stopped");
        Ok(())
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
