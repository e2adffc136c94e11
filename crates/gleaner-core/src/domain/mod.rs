//! Domain model (IDs, jobs, attempts, outcomes, payload, gate).

pub mod attempt;
pub mod gate;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod payload;

pub use attempt::{AttemptOutcome, DeliveryAttempt};
pub use gate::qualifies;
pub use ids::JobId;
pub use job::{FailureReason, Job, JobStatus, RawJob};
pub use outcome::GeneratedContent;
pub use payload::WebhookPayload;
