//! Content generator over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::domain::{GeneratedContent, Job};
use crate::error::{GenerationError, truncate_reason};
use crate::ports::ContentGenerator;

/// POSTs `{job, profile}` and expects `{score, cover_letter, interview_script}` back.
pub struct HttpContentGenerator {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    job: &'a Job,
    profile: &'a str,
}

impl HttpContentGenerator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(&self, job: &Job, profile: &str) -> Result<GeneratedContent, GenerationError> {
        let response = self
            .client
            .post(&self.url)
            .json(&GenerateRequest { job, profile })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError("generator timed out".into())
                } else {
                    GenerationError(truncate_reason(&e.to_string()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError(truncate_reason(&format!(
                "status {}: {body}",
                status.as_u16()
            ))));
        }

        let content: GeneratedContent = response
            .json()
            .await
            .map_err(|e| GenerationError(format!("invalid generator response: {e}")))?;
        if !content.score.is_finite() {
            return Err(GenerationError("generator returned no usable score".into()));
        }
        tracing::debug!(job_id = %job.id, score = content.score, "content generated");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::raw_job;
    use chrono::Utc;
    use mockito::Matcher;

    fn job() -> Job {
        Job::from_raw(raw_job("J1"), Utc::now(), 0)
    }

    #[tokio::test]
    async fn posts_job_and_profile() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/generate")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "job": {"id": "J1", "title": "Job J1"},
                "profile": "Rust, agents"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"score": 8.5, "cover_letter": "X", "interview_script": "Y"}"#)
            .create_async()
            .await;

        let generator =
            HttpContentGenerator::new(format!("{}/generate", server.url()), Duration::from_secs(5)).unwrap();
        let content = generator.generate(&job(), "Rust, agents").await.unwrap();

        mock.assert_async().await;
        assert_eq!(content, GeneratedContent::new(8.5, "X", "Y"));
    }

    #[tokio::test]
    async fn server_error_is_a_generation_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", Matcher::Any)
            .with_status(500)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let generator = HttpContentGenerator::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = generator.generate(&job(), "p").await.unwrap_err();
        assert!(err.0.contains("500"));
    }

    #[tokio::test]
    async fn missing_score_is_a_generation_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", Matcher::Any)
            .with_status(200)
            .with_body(r#"{"cover_letter": "X"}"#)
            .create_async()
            .await;

        let generator = HttpContentGenerator::new(server.url(), Duration::from_secs(5)).unwrap();
        assert!(generator.generate(&job(), "p").await.is_err());
    }
}
