//! App - アプリケーション層
//!
//! このモジュールは、ports と store を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Poller**: tick ループ（fetch→record→score→gate→deliver→cleanup）
//! - **Notifier**: Webhook 配送とリトライ予約
//! - **CircuitBreaker**: 生成器の保護
//! - **health**: /health と /metrics
//! - **Metrics**: Prometheus カウンタ

pub mod breaker;
pub mod builder;
pub mod health;
pub mod metrics;
pub mod notifier;
pub mod poller;

// 主要な型を再エクスポート
pub use self::breaker::{BreakerState, CircuitBreaker};
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::health::{HealthState, Liveness};
pub use self::metrics::Metrics;
pub use self::notifier::{DeliveryOutcome, Notifier, NotifierSettings};
pub use self::poller::{Poller, PollerSettings, TickReport};
