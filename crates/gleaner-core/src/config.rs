//! Configuration loaded from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    pub search_query: String,
    pub polling_interval: Duration,
    pub max_jobs_per_poll: usize,
    pub job_retention_days: u32,
    pub high_value_threshold: f64,
    pub webhook_url: String,
    pub max_delivery_attempts: u32,
    pub delivery_backoff_base: Duration,
    pub delivery_backoff_max: Duration,
    pub source_url: String,
    pub generator_url: String,
    pub profile_path: PathBuf,
    pub data_dir: PathBuf,
    pub health_bind_addr: SocketAddr,
    pub max_generation_attempts: u32,
    pub stuck_job_timeout: Duration,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
    pub webhook_timeout: Duration,
    pub poll_backoff_max: Duration,
    pub health_stale_factor: u32,
    pub breaker_failure_threshold: u32,
    pub breaker_reset: Duration,
}

struct Lookup<F> {
    get: F,
}

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.get)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn string(&self, key: &'static str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.raw(key).ok_or(ConfigError::Missing(key))
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn positive<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + std::fmt::Display + Copy,
        T::Err: std::fmt::Display,
    {
        let value = self.parse(key, default)?;
        if value <= T::default() {
            return Err(invalid(key, value, "must be greater than zero"));
        }
        Ok(value)
    }

    fn seconds(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.positive(key, default).map(Duration::from_secs)
    }
}

fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn http_url(key: &'static str, value: String) -> Result<String, ConfigError> {
    match reqwest::Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(value),
        Ok(_) => Err(invalid(key, value, "must be an http(s) URL")),
        Err(e) => Err(invalid(key, &value, &e.to_string())),
    }
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup { get };

        let high_value_threshold: f64 = env.parse("HIGH_VALUE_THRESHOLD", 7.0)?;
        if !high_value_threshold.is_finite() || !(0.0..=10.0).contains(&high_value_threshold) {
            return Err(invalid(
                "HIGH_VALUE_THRESHOLD",
                high_value_threshold,
                "must be a number between 0 and 10",
            ));
        }

        let delivery_backoff_base = env.seconds("DELIVERY_BACKOFF_BASE_SECONDS", 30)?;
        let delivery_backoff_max = env.seconds("DELIVERY_BACKOFF_MAX_SECONDS", 3600)?;
        if delivery_backoff_max < delivery_backoff_base {
            return Err(invalid(
                "DELIVERY_BACKOFF_MAX_SECONDS",
                delivery_backoff_max.as_secs(),
                "must not be below DELIVERY_BACKOFF_BASE_SECONDS",
            ));
        }

        Ok(Self {
            search_query: env.string("SEARCH_QUERY", "AI agent Developer"),
            polling_interval: env.seconds("POLLING_INTERVAL_SECONDS", 480)?,
            max_jobs_per_poll: env.positive("MAX_JOBS_PER_POLL", 10)?,
            job_retention_days: env.positive("JOB_RETENTION_DAYS", 30)?,
            high_value_threshold,
            webhook_url: http_url("WEBHOOK_URL", env.required("WEBHOOK_URL")?)?,
            max_delivery_attempts: env.positive("MAX_DELIVERY_ATTEMPTS", 5)?,
            delivery_backoff_base,
            delivery_backoff_max,
            source_url: http_url("SOURCE_URL", env.required("SOURCE_URL")?)?,
            generator_url: http_url("GENERATOR_URL", env.required("GENERATOR_URL")?)?,
            profile_path: PathBuf::from(env.string("FREELANCER_PROFILE_PATH", "./files/profile.md")),
            data_dir: PathBuf::from(env.string("DATA_DIR", "./files/job_tracking")),
            health_bind_addr: env.parse("HEALTH_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
            max_generation_attempts: env.positive("MAX_GENERATION_ATTEMPTS", 3)?,
            stuck_job_timeout: env.seconds("STUCK_JOB_TIMEOUT_SECONDS", 1800)?,
            cache_ttl: env.seconds("CACHE_TTL_SECONDS", 86_400)?,
            request_timeout: env.seconds("REQUEST_TIMEOUT_SECONDS", 60)?,
            webhook_timeout: env.seconds("WEBHOOK_TIMEOUT_SECONDS", 10)?,
            poll_backoff_max: env.seconds("POLL_BACKOFF_MAX_SECONDS", 3600)?,
            health_stale_factor: env.positive("HEALTH_STALE_FACTOR", 3)?,
            breaker_failure_threshold: env.positive("BREAKER_FAILURE_THRESHOLD", 5)?,
            breaker_reset: env.seconds("BREAKER_RESET_SECONDS", 60)?,
        })
    }

    pub fn jobs_path(&self) -> PathBuf {
        self.data_dir.join("jobs.json")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("cache.json")
    }
}
