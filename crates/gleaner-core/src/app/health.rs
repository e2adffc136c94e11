//! Health and metrics HTTP surface.
//!
//! Reads only atomics and prometheus counters; nothing here takes a lock the
//! poller could be waiting on.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::metrics::Metrics;
use crate::ports::Clock;

const NEVER: i64 = i64::MIN;

/// Heartbeat written by the poller after every tick.
#[derive(Debug)]
pub struct Liveness {
    started_at: DateTime<Utc>,
    last_tick_ms: AtomicI64,
}

impl Liveness {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            last_tick_ms: AtomicI64::new(NEVER),
        }
    }

    pub fn beat(&self, at: DateTime<Utc>) {
        self.last_tick_ms.store(at.timestamp_millis(), Ordering::Release);
    }

    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        match self.last_tick_ms.load(Ordering::Acquire) {
            NEVER => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Ticked within `window` of `now`. Before the first tick the process
    /// start time stands in, so a fresh process gets one window of grace.
    pub fn is_alive(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let reference = self.last_tick().unwrap_or(self.started_at);
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        now - reference <= window
    }
}

#[derive(Clone)]
pub struct HealthState {
    pub liveness: Arc<Liveness>,
    pub metrics: Metrics,
    pub clock: Arc<dyn Clock>,
    pub polling_interval: Duration,
    pub stale_factor: u32,
    pub max_jobs_per_poll: usize,
    pub high_value_threshold: f64,
}

impl HealthState {
    fn window(&self) -> Duration {
        self.polling_interval.saturating_mul(self.stale_factor.max(1))
    }
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: DateTime<Utc>,
    last_tick_at: Option<DateTime<Utc>>,
    uptime_secs: i64,
    polling_interval_seconds: u64,
    max_jobs_per_poll: usize,
    high_value_threshold: f64,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .fallback(not_found)
        .with_state(state)
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    let now = state.clock.now();
    let alive = state.liveness.is_alive(now, state.window());
    let body = HealthBody {
        status: if alive { "ok" } else { "stale" },
        timestamp: now,
        last_tick_at: state.liveness.last_tick(),
        uptime_secs: (now - state.liveness.started_at()).num_seconds().max(0),
        polling_interval_seconds: state.polling_interval.as_secs(),
        max_jobs_per_poll: state.max_jobs_per_poll,
        high_value_threshold: state.high_value_threshold,
    };
    let code = if alive {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

async fn metrics(State(state): State<HealthState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode metrics: {e}"),
            )
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not Found" })),
    )
}
