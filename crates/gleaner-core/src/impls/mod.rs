//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **HttpJobSource**: リスティングサービスへの GET
//! - **HttpContentGenerator**: スコアリング・文面生成サービスへの POST
//! - **CachedGenerator**: ContentCache を前段に置く ContentGenerator
//! - **HttpWebhookSender**: Webhook への POST

pub mod cached_generator;
pub mod http_generator;
pub mod http_source;
pub mod http_webhook;

// 主要な型を再エクスポート
pub use self::cached_generator::CachedGenerator;
pub use self::http_generator::HttpContentGenerator;
pub use self::http_source::HttpJobSource;
pub use self::http_webhook::HttpWebhookSender;
