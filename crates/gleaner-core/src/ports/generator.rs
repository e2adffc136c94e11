//! ContentGenerator port - スコアリングと文面生成
//!
//! スコアの算出方法はコアの関心外。

use async_trait::async_trait;

use crate::domain::{GeneratedContent, Job};
use crate::error::GenerationError;

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Score `job` against `profile` and produce the cover letter and interview script.
    async fn generate(&self, job: &Job, profile: &str) -> Result<GeneratedContent, GenerationError>;
}
