//! Generation outcome: what the content generator hands back for one job.
//!
//! The core never decides how `score` is computed; it only carries it.

use serde::{Deserialize, Serialize};

/// Result of one successful generation call.
///
/// `score` belongs to the attempt that produced it. A job that is re-scored
/// after a failure may land on the other side of the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub score: f64,

    #[serde(default)]
    pub cover_letter: String,

    #[serde(default)]
    pub interview_script: String,
}

impl GeneratedContent {
    pub fn new(
        score: f64,
        cover_letter: impl Into<String>,
        interview_script: impl Into<String>,
    ) -> Self {
        Self {
            score,
            cover_letter: cover_letter.into(),
            interview_script: interview_script.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_text_fields_default_to_empty() {
        let content: GeneratedContent = serde_json::from_str(r#"{"score": 6.5}"#).unwrap();
        assert_eq!(content.score, 6.5);
        assert!(content.cover_letter.is_empty());
        assert!(content.interview_script.is_empty());
    }
}
