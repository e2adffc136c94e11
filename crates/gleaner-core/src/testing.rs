//! Test doubles for the collaborator ports.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::config::Config;
use crate::domain::{GeneratedContent, Job, JobId, RawJob, WebhookPayload};
use crate::error::{DeliveryError, GenerationError, SourceFetchError};
use crate::ports::{ContentGenerator, JobSource, WebhookSender};

/// Defaults plus dummy endpoints, with state kept under `data_dir`.
pub fn test_config(data_dir: &Path) -> Config {
    let data_dir = data_dir.display().to_string();
    Config::from_lookup(|key| match key {
        "WEBHOOK_URL" => Some("http://127.0.0.1:9/hook".to_string()),
        "SOURCE_URL" => Some("http://127.0.0.1:9/listings".to_string()),
        "GENERATOR_URL" => Some("http://127.0.0.1:9/generate".to_string()),
        "DATA_DIR" => Some(data_dir.clone()),
        _ => None,
    })
    .unwrap()
}

pub fn raw_job(id: &str) -> RawJob {
    RawJob {
        id: JobId::new(id),
        title: format!("Job {id}"),
        description: format!("Description of {id}"),
        job_type: "Hourly".into(),
        experience_level: "Expert".into(),
        duration: "1-3 months".into(),
        rate: "$50-70/hr".into(),
        client_info: "Payment verified".into(),
        url: format!("https://jobs.example.com/{id}"),
    }
}

/// Returns the same listing on every fetch, after any queued failures.
#[derive(Default)]
pub struct FakeSource {
    listings: Mutex<Vec<RawJob>>,
    failures: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
    last_limit: AtomicUsize,
}

impl FakeSource {
    pub fn new(listings: Vec<RawJob>) -> Self {
        Self {
            listings: Mutex::new(listings),
            ..Default::default()
        }
    }

    pub fn set_listings(&self, listings: Vec<RawJob>) {
        *self.listings.lock().unwrap() = listings;
    }

    /// The next `n` fetches fail.
    pub fn fail_next(&self, n: usize) {
        let mut failures = self.failures.lock().unwrap();
        for i in 0..n {
            failures.push_back(format!("listing service unavailable ({i})"));
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_limit(&self) -> usize {
        self.last_limit.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobSource for FakeSource {
    async fn fetch_listings(
        &self,
        _query: &str,
        limit: usize,
    ) -> Result<Vec<RawJob>, SourceFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_limit.store(limit, Ordering::SeqCst);
        if let Some(reason) = self.failures.lock().unwrap().pop_front() {
            return Err(SourceFetchError(reason));
        }
        Ok(self.listings.lock().unwrap().clone())
    }
}

/// Scores by job id. Unknown ids score `default_score`.
pub struct FakeGenerator {
    default_score: f64,
    scores: Mutex<HashMap<JobId, f64>>,
    failing: Mutex<HashSet<JobId>>,
    calls: Mutex<Vec<JobId>>,
}

impl FakeGenerator {
    pub fn new(default_score: f64) -> Self {
        Self {
            default_score,
            scores: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_score(self, id: &str, score: f64) -> Self {
        self.scores.lock().unwrap().insert(JobId::new(id), score);
        self
    }

    pub fn fail_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(JobId::new(id));
    }

    pub fn recover(&self, id: &str) {
        self.failing.lock().unwrap().remove(&JobId::new(id));
    }

    pub fn calls(&self) -> Vec<JobId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        let id = JobId::new(id);
        self.calls.lock().unwrap().iter().filter(|c| **c == id).count()
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate(&self, job: &Job, _profile: &str) -> Result<GeneratedContent, GenerationError> {
        self.calls.lock().unwrap().push(job.id.clone());
        if self.failing.lock().unwrap().contains(&job.id) {
            return Err(GenerationError(format!("generator refused {}", job.id)));
        }
        let score = self
            .scores
            .lock()
            .unwrap()
            .get(&job.id)
            .copied()
            .unwrap_or(self.default_score);
        Ok(GeneratedContent::new(
            score,
            format!("Cover letter for {}", job.id),
            format!("Interview script for {}", job.id),
        ))
    }
}

/// Captures every payload; fails with `error` while one is set.
#[derive(Default)]
pub struct RecordingSender {
    payloads: Mutex<Vec<WebhookPayload>>,
    error: Mutex<Option<DeliveryError>>,
    attempts: AtomicUsize,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: DeliveryError) -> Self {
        let sender = Self::default();
        sender.set_error(Some(error));
        sender
    }

    pub fn set_error(&self, error: Option<DeliveryError>) {
        *self.error.lock().unwrap() = error;
    }

    /// Payloads the webhook accepted.
    pub fn delivered(&self) -> Vec<WebhookPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(err);
        }
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}
