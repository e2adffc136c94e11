//! Ports - 抽象化レイヤー
//!
//! 外部コラボレータ（リスティング元、生成器、Webhook）と時計への
//! インターフェース。実装は `impls` に置く。

pub mod clock;
pub mod generator;
pub mod job_source;
pub mod webhook;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::generator::ContentGenerator;
pub use self::job_source::JobSource;
pub use self::webhook::WebhookSender;
