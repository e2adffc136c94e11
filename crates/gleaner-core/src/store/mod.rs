//! Job store: durable record of every job ever seen.
//!
//! Design:
//! - One record per job id; status enum instead of separate seen/processed files.
//! - Every mutation builds the next state, persists it atomically, then swaps
//!   it in. A failed write leaves both disk and memory at the previous state.
//! - Records that fail to decode on load are quarantined one by one.

mod persist;

pub(crate) use persist::{read_optional, write_atomic};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FailureReason, Job, JobId, JobStatus, RawJob};
use crate::error::StoreError;
use crate::ports::{Clock, SystemClock};
use persist::QuarantinedRecord;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub seen: usize,
    pub scoring: usize,
    pub processed: usize,
    pub failed: usize,
    pub delivered: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    jobs: HashMap<JobId, Job>,
    next_seq: u64,
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    next_seq: u64,
    jobs: BTreeMap<&'a str, &'a Job>,
}

#[derive(Deserialize)]
struct StoreFile {
    #[serde(default)]
    next_seq: u64,
    #[serde(default)]
    jobs: BTreeMap<String, serde_json::Value>,
}

pub struct JobStore {
    path: PathBuf,
    max_generation_attempts: u32,
    clock: Arc<dyn Clock>,
    state: RwLock<StoreState>,
}

impl JobStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>, max_generation_attempts: u32) -> Result<Self, StoreError> {
        Self::open_with_clock(path, max_generation_attempts, Arc::new(SystemClock))
    }

    /// Like [`JobStore::open`]; `clock` stamps quarantined records.
    pub fn open_with_clock(
        path: impl Into<PathBuf>,
        max_generation_attempts: u32,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let state = load(&path, clock.now())?;
        tracing::info!(
            path = %path.display(),
            jobs = state.jobs.len(),
            "job store opened"
        );
        Ok(Self {
            path,
            max_generation_attempts,
            clock,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_generation_attempts(&self) -> u32 {
        self.max_generation_attempts
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Re-read the on-disk state. Called at the start of every tick.
    pub fn reload(&self) -> Result<(), StoreError> {
        let fresh = load(&self.path, self.clock.now())?;
        *self.write() = fresh;
        Ok(())
    }

    /// True iff a job with this id has ever been recorded, regardless of status.
    pub fn is_known(&self, id: &JobId) -> bool {
        self.read().jobs.contains_key(id)
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.read().jobs.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().jobs.is_empty()
    }

    /// All records in discovery order, for inspection.
    pub fn all(&self) -> Vec<Job> {
        let state = self.read();
        sorted(state.jobs.values().cloned())
    }

    /// Insert `raw` as a new Seen job, or return the existing record untouched.
    pub fn record_seen(&self, raw: RawJob, now: DateTime<Utc>) -> Result<Job, StoreError> {
        let mut state = self.write();
        if let Some(existing) = state.jobs.get(&raw.id) {
            return Ok(existing.clone());
        }

        let mut next = state.clone();
        let job = Job::from_raw(raw, now, next.next_seq);
        next.next_seq += 1;
        next.jobs.insert(job.id.clone(), job.clone());
        persist(&self.path, &next)?;
        *state = next;

        tracing::debug!(job_id = %job.id, "job recorded as seen");
        Ok(job)
    }

    /// Persist a state transition.
    ///
    /// Rejects with `InvalidTransition` anything the lifecycle does not allow
    /// from the stored status. `discovered_at` and `seq` stay as stored.
    pub fn update(&self, job: Job) -> Result<(), StoreError> {
        let mut state = self.write();
        let current = state
            .jobs
            .get(&job.id)
            .ok_or_else(|| StoreError::UnknownJob(job.id.clone()))?;
        self.check_transition(current, &job)?;

        let mut job = job;
        job.discovered_at = current.discovered_at;
        job.seq = current.seq;

        let mut next = state.clone();
        next.jobs.insert(job.id.clone(), job);
        persist(&self.path, &next)?;
        *state = next;
        Ok(())
    }

    fn check_transition(&self, current: &Job, next: &Job) -> Result<(), StoreError> {
        let invalid = || StoreError::InvalidTransition {
            id: current.id.clone(),
            from: current.status,
            to: next.status,
        };

        if !current.status.can_transition_to(next.status) {
            return Err(invalid());
        }
        if current.status == JobStatus::Failed && !current.is_retryable(self.max_generation_attempts) {
            return Err(invalid());
        }
        if next.status == JobStatus::Delivered && !next.has_successful_delivery() {
            return Err(invalid());
        }
        if next.attempts.len() < current.attempts.len() {
            return Err(invalid());
        }
        Ok(())
    }

    /// Seen jobs and Failed jobs with generation retries left, in discovery order.
    pub fn list_pending(&self) -> Vec<Job> {
        let state = self.read();
        let max = self.max_generation_attempts;
        sorted(
            state
                .jobs
                .values()
                .filter(|j| j.status == JobStatus::Seen || j.is_retryable(max))
                .cloned(),
        )
    }

    /// Processed jobs whose next delivery step is due at `now`, in discovery order.
    pub fn list_delivery_due(&self, now: DateTime<Utc>) -> Vec<Job> {
        let state = self.read();
        sorted(
            state
                .jobs
                .values()
                .filter(|j| j.is_delivery_due(now))
                .cloned(),
        )
    }

    /// Move jobs left in Scoring for longer than `timeout` to Failed(stuck).
    pub fn fail_stuck(&self, now: DateTime<Utc>, timeout: Duration) -> Result<Vec<JobId>, StoreError> {
        let mut state = self.write();
        let mut next = state.clone();
        let mut stuck = Vec::new();

        for job in next.jobs.values_mut() {
            if job.status != JobStatus::Scoring {
                continue;
            }
            let started = job.scoring_started_at.unwrap_or(job.discovered_at);
            if now - started < timeout {
                continue;
            }
            let reason = format!("stuck in scoring since {}", started.to_rfc3339());
            job.fail(FailureReason::Stuck, reason)?;
            stuck.push(job.id.clone());
        }

        if !stuck.is_empty() {
            persist(&self.path, &next)?;
            *state = next;
            for id in &stuck {
                tracing::warn!(job_id = %id, reason = "stuck", "job moved to failed");
            }
        }
        Ok(stuck)
    }

    /// Remove terminal jobs discovered more than `retention` before `now`.
    ///
    /// Seen, Scoring, Processed (delivery pending) and retryable Failed jobs are
    /// kept regardless of age.
    pub fn purge_older_than(&self, retention: Duration, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = now - retention;
        let max = self.max_generation_attempts;
        let mut state = self.write();

        let expired: Vec<JobId> = state
            .jobs
            .values()
            .filter(|j| j.discovered_at < cutoff && j.is_terminal(max))
            .map(|j| j.id.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let mut next = state.clone();
        for id in &expired {
            next.jobs.remove(id);
        }
        persist(&self.path, &next)?;
        *state = next;

        tracing::info!(purged = expired.len(), cutoff = %cutoff, "purged old jobs");
        Ok(expired.len())
    }

    pub fn counts(&self) -> StoreCounts {
        let state = self.read();
        let mut counts = StoreCounts::default();
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Seen => counts.seen += 1,
                JobStatus::Scoring => counts.scoring += 1,
                JobStatus::Processed => counts.processed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Delivered => counts.delivered += 1,
                JobStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    /// Rewrite the current state to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        let state = self.read();
        persist(&self.path, &state)
    }
}

fn sorted(jobs: impl Iterator<Item = Job>) -> Vec<Job> {
    let mut jobs: Vec<Job> = jobs.collect();
    jobs.sort_by(|a, b| (a.discovered_at, a.seq).cmp(&(b.discovered_at, b.seq)));
    jobs
}

fn persist(path: &Path, state: &StoreState) -> Result<(), StoreError> {
    let file = StoreFileRef {
        version: STORE_VERSION,
        next_seq: state.next_seq,
        jobs: state.jobs.iter().map(|(id, job)| (id.as_str(), job)).collect(),
    };
    let bytes = serde_json::to_vec_pretty(&file)?;
    write_atomic(path, &bytes)
}

fn load(path: &Path, now: DateTime<Utc>) -> Result<StoreState, StoreError> {
    let Some(bytes) = read_optional(path)? else {
        return Ok(StoreState::default());
    };
    let file: StoreFile = serde_json::from_slice(&bytes).map_err(|e| StoreError::Corruption {
        id: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut state = StoreState {
        jobs: HashMap::with_capacity(file.jobs.len()),
        next_seq: file.next_seq,
    };
    let mut bad = BTreeMap::new();

    for (key, raw) in file.jobs {
        let decoded = serde_json::from_value::<Job>(raw.clone())
            .map_err(|e| e.to_string())
            .and_then(|job| {
                if job.id.as_str() == key {
                    Ok(job)
                } else {
                    Err(format!("record id {} does not match key", job.id))
                }
            });
        match decoded {
            Ok(job) => {
                state.next_seq = state.next_seq.max(job.seq + 1);
                state.jobs.insert(job.id.clone(), job);
            }
            Err(reason) => {
                let err = StoreError::Corruption {
                    id: key.clone(),
                    reason: reason.clone(),
                };
                tracing::error!(job_id = %key, error = %err, "quarantining corrupt job record");
                bad.insert(
                    key,
                    QuarantinedRecord {
                        raw,
                        reason,
                        quarantined_at: now,
                    },
                );
            }
        }
    }

    if !bad.is_empty() {
        persist::quarantine(path, bad)?;
        persist(path, &state)?;
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeliveryAttempt, GeneratedContent};
    use crate::ports::FixedClock;
    use crate::testing::raw_job;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn open(dir: &TempDir) -> JobStore {
        JobStore::open(dir.path().join("jobs.json"), 3).unwrap()
    }

    fn processed(store: &JobStore, id: &str, score: f64) -> Job {
        let mut job = store.record_seen(raw_job(id), t0()).unwrap();
        job.begin_scoring(t0()).unwrap();
        store.update(job.clone()).unwrap();
        job.complete(GeneratedContent::new(score, "c", "s"), t0()).unwrap();
        store.update(job.clone()).unwrap();
        job
    }

    #[test]
    fn record_seen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let first = store.record_seen(raw_job("X"), t0()).unwrap();
        let second = store
            .record_seen(raw_job("X"), t0() + Duration::hours(1))
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(first, second);
        assert!(store.is_known(&JobId::new("X")));
        assert!(!store.is_known(&JobId::new("Y")));
    }

    #[test]
    fn record_seen_keeps_progressed_job() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        processed(&store, "X", 8.0);

        let again = store.record_seen(raw_job("X"), t0()).unwrap();
        assert_eq!(again.status, JobStatus::Processed);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_rejects_invalid_transition() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut job = store.record_seen(raw_job("X"), t0()).unwrap();
        job.status = JobStatus::Delivered;

        let err = store.update(job).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition { from: JobStatus::Seen, to: JobStatus::Delivered, .. }
        ));
        assert_eq!(store.get(&JobId::new("X")).unwrap().status, JobStatus::Seen);
    }

    #[test]
    fn update_rejects_leaving_terminal_state() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut job = processed(&store, "X", 2.0);
        job.skip().unwrap();
        store.update(job.clone()).unwrap();

        job.status = JobStatus::Processed;
        assert!(matches!(
            store.update(job),
            Err(StoreError::InvalidTransition { from: JobStatus::Skipped, .. })
        ));
    }

    #[test]
    fn update_rejects_delivered_without_success_attempt() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut job = processed(&store, "X", 9.0);
        job.status = JobStatus::Delivered;
        assert!(matches!(
            store.update(job),
            Err(StoreError::InvalidTransition { to: JobStatus::Delivered, .. })
        ));
    }

    #[test]
    fn update_rejects_rescoring_exhausted_job() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut job = store.record_seen(raw_job("X"), t0()).unwrap();
        for _ in 0..3 {
            job.begin_scoring(t0()).unwrap();
            store.update(job.clone()).unwrap();
            job.fail(FailureReason::Generation("boom".into()), "boom".into())
                .unwrap();
            store.update(job.clone()).unwrap();
        }

        job.status = JobStatus::Scoring;
        assert!(matches!(
            store.update(job),
            Err(StoreError::InvalidTransition { from: JobStatus::Failed, .. })
        ));
        assert!(store.list_pending().is_empty());
    }

    #[test]
    fn update_unknown_job_fails() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let job = Job::from_raw(raw_job("ghost"), t0(), 0);
        assert!(matches!(store.update(job), Err(StoreError::UnknownJob(_))));
    }

    #[test]
    fn list_pending_in_discovery_order() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.record_seen(raw_job("b"), t0()).unwrap();
        store.record_seen(raw_job("a"), t0()).unwrap();
        store
            .record_seen(raw_job("early"), t0() - Duration::hours(1))
            .unwrap();
        processed(&store, "done", 5.0);

        let ids: Vec<String> = store
            .list_pending()
            .into_iter()
            .map(|j| j.id.to_string())
            .collect();
        assert_eq!(ids, vec!["early", "b", "a"]);
    }

    #[test]
    fn list_delivery_due_respects_next_retry_at() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut job = processed(&store, "X", 9.0);
        assert_eq!(store.list_delivery_due(t0()).len(), 1);

        let retry_at = t0() + Duration::minutes(5);
        job.record_failed_delivery(DeliveryAttempt::failure(1, t0(), "503", Some(retry_at)))
            .unwrap();
        store.update(job).unwrap();

        assert!(store.list_delivery_due(t0() + Duration::minutes(4)).is_empty());
        assert_eq!(store.list_delivery_due(retry_at).len(), 1);
    }

    #[test]
    fn purge_removes_old_terminal_and_keeps_in_flight() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let mut delivered = processed(&store, "delivered", 9.0);
        delivered
            .mark_delivered(DeliveryAttempt::success(1, t0()))
            .unwrap();
        store.update(delivered).unwrap();

        let mut exhausted = processed(&store, "exhausted", 9.0);
        exhausted
            .fail(FailureReason::DeliveryExhausted, "gave up".into())
            .unwrap();
        store.update(exhausted).unwrap();

        store.record_seen(raw_job("seen"), t0()).unwrap();
        let mut scoring = store.record_seen(raw_job("scoring"), t0()).unwrap();
        scoring.begin_scoring(t0()).unwrap();
        store.update(scoring).unwrap();

        let now = t0() + Duration::days(31);
        let purged = store.purge_older_than(Duration::days(30), now).unwrap();

        assert_eq!(purged, 2);
        assert!(!store.is_known(&JobId::new("delivered")));
        assert!(!store.is_known(&JobId::new("exhausted")));
        assert!(store.is_known(&JobId::new("seen")));
        assert!(store.is_known(&JobId::new("scoring")));
    }

    #[test]
    fn purge_keeps_recent_terminal_jobs() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut job = processed(&store, "X", 1.0);
        job.skip().unwrap();
        store.update(job).unwrap();

        let purged = store
            .purge_older_than(Duration::days(30), t0() + Duration::days(29))
            .unwrap();
        assert_eq!(purged, 0);
        assert!(store.is_known(&JobId::new("X")));
    }

    #[test]
    fn stuck_scoring_job_moves_to_failed() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut job = store.record_seen(raw_job("X"), t0()).unwrap();
        job.begin_scoring(t0()).unwrap();
        store.update(job).unwrap();

        let none = store
            .fail_stuck(t0() + Duration::minutes(10), Duration::minutes(30))
            .unwrap();
        assert!(none.is_empty());

        let stuck = store
            .fail_stuck(t0() + Duration::minutes(30), Duration::minutes(30))
            .unwrap();
        assert_eq!(stuck, vec![JobId::new("X")]);

        let job = store.get(&JobId::new("X")).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure, Some(FailureReason::Stuck));
        assert!(job.is_retryable(3));
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            let mut job = processed(&store, "X", 9.0);
            job.mark_delivered(DeliveryAttempt::success(1, t0())).unwrap();
            store.update(job).unwrap();
            store.record_seen(raw_job("Y"), t0()).unwrap();
        }

        let store = open(&dir);
        assert_eq!(store.len(), 2);
        let x = store.get(&JobId::new("X")).unwrap();
        assert_eq!(x.status, JobStatus::Delivered);
        assert_eq!(x.delivery_attempts(), 1);

        let z = store.record_seen(raw_job("Z"), t0()).unwrap();
        let y = store.get(&JobId::new("Y")).unwrap();
        assert!(z.seq > y.seq);
    }

    #[test]
    fn corrupt_record_is_quarantined_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");
        {
            let store = JobStore::open(&path, 3).unwrap();
            store.record_seen(raw_job("good"), t0()).unwrap();
        }

        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        doc["jobs"]["bad"] = serde_json::json!({"id": "bad", "status": "exploded"});
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let store = JobStore::open(&path, 3).unwrap();
        assert!(store.is_known(&JobId::new("good")));
        assert!(!store.is_known(&JobId::new("bad")));

        let qpath = dir.path().join("jobs.quarantine.json");
        let quarantined: serde_json::Value =
            serde_json::from_slice(&std::fs::read(qpath).unwrap()).unwrap();
        assert_eq!(quarantined["bad"]["raw"]["status"], "exploded");

        // the rewritten store no longer carries the bad record
        let reopened = JobStore::open(&path, 3).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn quarantine_is_stamped_by_the_store_clock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&serde_json::json!({
                "version": 1,
                "jobs": {"bad": {"id": "bad", "status": "exploded"}}
            }))
            .unwrap(),
        )
        .unwrap();

        let clock = Arc::new(FixedClock::new(t0()));
        let store = JobStore::open_with_clock(&path, 3, clock).unwrap();
        assert!(store.is_empty());

        let quarantined: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("jobs.quarantine.json")).unwrap())
                .unwrap();
        let stamped: DateTime<Utc> =
            serde_json::from_value(quarantined["bad"]["quarantined_at"].clone()).unwrap();
        assert_eq!(stamped, t0());
    }

    #[test]
    fn unreadable_document_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            JobStore::open(&path, 3),
            Err(StoreError::Corruption { .. })
        ));
    }

    #[test]
    fn reload_picks_up_disk_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");
        let a = JobStore::open(&path, 3).unwrap();
        let b = JobStore::open(&path, 3).unwrap();

        a.record_seen(raw_job("X"), t0()).unwrap();
        assert!(!b.is_known(&JobId::new("X")));
        b.reload().unwrap();
        assert!(b.is_known(&JobId::new("X")));
    }

    #[test]
    fn counts_by_status() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.record_seen(raw_job("a"), t0()).unwrap();
        processed(&store, "b", 1.0);
        let counts = store.counts();
        assert_eq!(counts.seen, 1);
        assert_eq!(counts.processed, 1);
        assert_eq!(counts.delivered, 0);
    }
}
