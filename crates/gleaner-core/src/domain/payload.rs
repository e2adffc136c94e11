//! Webhook payload sent for qualifying jobs.
//!
//! The job `id` is always present so the receiver can drop duplicates:
//! delivery is at-least-once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::job::Job;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub timestamp: DateTime<Utc>,
    pub job_details: JobDetails,
    pub generated_content: GeneratedSection,
    pub metadata: PayloadMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetails {
    pub id: JobId,
    pub title: String,
    pub description: String,
    pub job_type: String,
    pub experience_level: String,
    pub duration: String,
    pub rate: String,
    pub client_information: String,
    pub score: Option<f64>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub cover_letter: Option<String>,
    pub interview_script: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadMetadata {
    pub processed_at: Option<DateTime<Utc>>,
    pub search_query: String,
    pub match_score: Option<f64>,
}

impl WebhookPayload {
    pub fn for_job(job: &Job, search_query: &str, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now,
            job_details: JobDetails {
                id: job.id.clone(),
                title: job.title.clone(),
                description: job.description.clone(),
                job_type: job.job_type.clone(),
                experience_level: job.experience_level.clone(),
                duration: job.duration.clone(),
                rate: job.rate.clone(),
                client_information: job.client_info.clone(),
                score: job.score,
                url: job.url.clone(),
            },
            generated_content: GeneratedSection {
                cover_letter: job.cover_letter.clone(),
                interview_script: job.interview_script.clone(),
            },
            metadata: PayloadMetadata {
                processed_at: job.processed_at,
                search_query: search_query.to_string(),
                match_score: job.score,
            },
        }
    }
}
