//! AppBuilder - JobStore / ports / metrics の組み立て
//!
//! Config から Notifier と Poller の設定を導き、CircuitBreaker と Liveness を
//! 生成して App にまとめる。cache が渡された場合は generator を
//! CachedGenerator で包む。HTTP ルーター（/health, /metrics）も同じ
//! Metrics と Liveness を共有する。

use std::sync::Arc;
use std::time::Duration;

use crate::app::breaker::CircuitBreaker;
use crate::app::health::{HealthState, Liveness};
use crate::app::metrics::Metrics;
use crate::app::notifier::{Notifier, NotifierSettings};
use crate::app::poller::{Poller, PollerSettings};
use crate::cache::ContentCache;
use crate::config::Config;
use crate::impls::CachedGenerator;
use crate::ports::{Clock, ContentGenerator, JobSource, SystemClock, WebhookSender};
use crate::retry::BackoffPolicy;
use crate::store::JobStore;

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(config)
///     .store(store)
///     .source(source)
///     .generator(generator)
///     .sender(sender)
///     .profile(profile)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - store / source / generator / sender / profile は必須
/// - build() 時に不足があれば BuildError を返す
/// - clock と metrics は省略するとデフォルト（SystemClock / 新しい Registry）
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<JobStore>>,
    source: Option<Arc<dyn JobSource>>,
    generator: Option<Arc<dyn ContentGenerator>>,
    sender: Option<Arc<dyn WebhookSender>>,
    cache: Option<Arc<ContentCache>>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<Metrics>,
    profile: Option<String>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing collaborators: {0:?}. These must be provided before build().")]
    MissingCollaborators(Vec<&'static str>),

    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            source: None,
            generator: None,
            sender: None,
            cache: None,
            clock: None,
            metrics: None,
            profile: None,
        }
    }

    pub fn store(mut self, store: Arc<JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn source(mut self, source: Arc<dyn JobSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn sender(mut self, sender: Arc<dyn WebhookSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// 生成結果キャッシュ。設定すると generator を CachedGenerator で包み、
    /// 毎 tick で期限切れエントリを掃除する。
    pub fn cache(mut self, cache: Arc<ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// cache を渡す場合は、同じ Metrics で開いたものを渡すこと。
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - 必須コラボレータが全て設定されているかチェック
    /// - 不足があれば BuildError::MissingCollaborators を返す
    pub fn build(self) -> Result<App, BuildError> {
        let mut missing = Vec::new();
        if self.store.is_none() {
            missing.push("store");
        }
        if self.source.is_none() {
            missing.push("source");
        }
        if self.generator.is_none() {
            missing.push("generator");
        }
        if self.sender.is_none() {
            missing.push("sender");
        }
        if self.profile.is_none() {
            missing.push("profile");
        }
        let (Some(store), Some(source), Some(generator), Some(sender), Some(profile)) = (
            self.store,
            self.source,
            self.generator,
            self.sender,
            self.profile,
        ) else {
            return Err(BuildError::MissingCollaborators(missing));
        };

        let config = self.config;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Metrics::new()?,
        };

        let generator: Arc<dyn ContentGenerator> = match &self.cache {
            Some(cache) => Arc::new(CachedGenerator::new(
                generator,
                Arc::clone(cache),
                config.cache_ttl,
            )),
            None => generator,
        };

        let notifier = Notifier::new(
            Arc::clone(&store),
            sender,
            Arc::clone(&clock),
            metrics.clone(),
            NotifierSettings {
                max_attempts: config.max_delivery_attempts,
                backoff: BackoffPolicy::exponential(
                    config.delivery_backoff_base,
                    config.delivery_backoff_max,
                ),
                threshold: config.high_value_threshold,
                search_query: config.search_query.clone(),
                timeout: config.webhook_timeout,
            },
        );

        let breaker = CircuitBreaker::new(
            "content-generator",
            config.breaker_failure_threshold,
            config.breaker_reset,
            Arc::clone(&clock),
        );

        let liveness = Arc::new(Liveness::new(clock.now()));

        let poller = Poller::new(
            Arc::clone(&store),
            source,
            generator,
            notifier,
            breaker,
            self.cache,
            Arc::clone(&clock),
            metrics.clone(),
            Arc::clone(&liveness),
            profile,
            PollerSettings {
                search_query: config.search_query.clone(),
                polling_interval: config.polling_interval,
                max_jobs_per_poll: config.max_jobs_per_poll,
                retention: chrono::Duration::days(i64::from(config.job_retention_days)),
                threshold: config.high_value_threshold,
                stuck_timeout: config.stuck_job_timeout,
                request_timeout: config.request_timeout,
                poll_backoff_max: config.poll_backoff_max,
            },
        );

        let health = HealthState {
            liveness,
            metrics: metrics.clone(),
            clock,
            polling_interval: config.polling_interval,
            stale_factor: config.health_stale_factor,
            max_jobs_per_poll: config.max_jobs_per_poll,
            high_value_threshold: config.high_value_threshold,
        };

        Ok(App {
            poller: Arc::new(poller),
            store,
            metrics,
            health,
            config,
        })
    }
}

/// App はアプリケーションのランタイム
///
/// - poller: バックグラウンドで tick を回す
/// - health: /health と /metrics のルーター用状態
pub struct App {
    pub poller: Arc<Poller>,
    pub store: Arc<JobStore>,
    pub metrics: Metrics,
    pub health: HealthState,
    pub config: Config,
}

impl App {
    pub fn router(&self) -> axum::Router {
        crate::app::health::router(self.health.clone())
    }

    pub fn polling_interval(&self) -> Duration {
        self.config.polling_interval
    }
}
