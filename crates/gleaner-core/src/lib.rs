//! gleaner-core
//!
//! Job-posting polling, dedup and delivery engine.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, attempt, outcome, payload, gate）
//! - **ports**: 抽象化レイヤー（Clock, JobSource, ContentGenerator, WebhookSender）
//! - **store**: JobStore（ジョブ状態の正本、原子的な永続化）
//! - **cache**: ContentCache（TTL 付き fingerprint キャッシュ）
//! - **retry**: BackoffPolicy
//! - **app**: アプリケーションロジック（builder, poller, notifier, breaker, health, metrics）
//! - **impls**: 実装（HTTP アダプタ、CachedGenerator）
//! - **config**: 環境変数からの設定
//! - **error**: エラー型

pub mod app;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod retry;
pub mod store;

#[cfg(test)]
mod testing;

pub use app::{App, AppBuilder, BuildError};
pub use config::Config;
