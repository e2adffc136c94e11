//! Read-through cache in front of a [`ContentGenerator`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{ContentCache, fingerprint};
use crate::domain::{GeneratedContent, Job};
use crate::error::GenerationError;
use crate::ports::ContentGenerator;

/// Reuses a generation for the same title, description and profile within
/// the TTL. Only successful generations are stored.
pub struct CachedGenerator {
    inner: Arc<dyn ContentGenerator>,
    cache: Arc<ContentCache>,
    ttl: Duration,
}

impl CachedGenerator {
    pub fn new(inner: Arc<dyn ContentGenerator>, cache: Arc<ContentCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    fn key(job: &Job, profile: &str) -> String {
        fingerprint(&["generate", job.title.as_str(), job.description.as_str(), profile])
    }
}

#[async_trait]
impl ContentGenerator for CachedGenerator {
    async fn generate(&self, job: &Job, profile: &str) -> Result<GeneratedContent, GenerationError> {
        let key = Self::key(job, profile);
        if let Some(content) = self.cache.get_json::<GeneratedContent>(&key) {
            tracing::debug!(job_id = %job.id, "generated content served from cache");
            return Ok(content);
        }

        let content = self.inner.generate(job, profile).await?;
        if let Err(e) = self.cache.put_json(&key, &content, self.ttl) {
            tracing::warn!(job_id = %job.id, error = %e, "failed to cache generated content");
        }
        Ok(content)
    }
}
