//! Job and job-result payloads exchanged with the generation backend.
//!
//! Wire format is camelCase JSON with lower-case statuses, e.g.
//! `{"jobId": "j1", "status": "processing", "createdAt": "...", "prompt": "..."}`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// Prompt recorded on finalization jobs, which carry no user prompt.
pub const FINALIZATION_PROMPT: &str = "Upscaling texture";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Backend-reported state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Still being worked on by the backend; polling should continue.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// No further transitions will happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// What a job was submitted for. Drives poll cadence and notice texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Generation,
    Modification,
    Finalization,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generation => "generation",
            Self::Modification => "modification",
            Self::Finalization => "finalization",
        }
    }

    /// Whether a completed job of this kind yields preview variations.
    pub fn produces_variations(self) -> bool {
        !matches!(self, Self::Finalization)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A backend-tracked unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variations: Option<Vec<String>>,
}

impl Job {
    /// Candidate output URLs, empty when the backend sent none.
    pub fn variations(&self) -> &[String] {
        self.variations.as_deref().unwrap_or_default()
    }
}

/// Loosely-typed job body as returned by submit and status endpoints.
///
/// Submission endpoints only guarantee `jobId`; the remaining fields are
/// filled client-side by [`JobPayload::into_job`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub job_id: JobId,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub variations: Option<Vec<String>>,
}

impl JobPayload {
    /// Build a [`Job`], defaulting missing fields.
    ///
    /// A missing status means the backend accepted the work and is
    /// processing it.
    pub fn into_job(self, fallback_prompt: &str, now: Timestamp) -> Job {
        Job {
            job_id: self.job_id,
            status: self.status.unwrap_or(JobStatus::Processing),
            created_at: self.created_at.unwrap_or(now),
            prompt: self.prompt.unwrap_or_else(|| fallback_prompt.to_string()),
            variations: self.variations,
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Deliverable metadata for a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: JobId,
    pub preview_image_url: String,
    pub high_res_image_url: String,
    pub prompt: String,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub is_public: bool,
    pub resolution: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn status_round_trips_lower_case() {
        let s: JobStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(s, JobStatus::Processing);
        assert_eq!(serde_json::to_string(&JobStatus::Completed).unwrap(), "\"completed\"");
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Processing.is_active());
        assert!(!JobStatus::Failed.is_active());
    }

    #[test]
    fn full_status_body_parses() {
        let json = serde_json::json!({
            "jobId": "j-1",
            "status": "completed",
            "createdAt": "2024-05-01T12:00:00Z",
            "prompt": "red brick wall",
            "variations": ["a", "b"]
        });
        let job: Job = serde_json::from_value(json).unwrap();
        assert_eq!(job.job_id.as_str(), "j-1");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.variations(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn job_without_variations_exposes_empty_slice() {
        let json = serde_json::json!({
            "jobId": "j-1",
            "status": "processing",
            "createdAt": "2024-05-01T12:00:00Z",
            "prompt": "p"
        });
        let job: Job = serde_json::from_value(json).unwrap();
        assert!(job.variations().is_empty());
    }

    #[test]
    fn submit_payload_fills_missing_fields() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let payload: JobPayload = serde_json::from_value(serde_json::json!({"jobId": "j-9"})).unwrap();
        let job = payload.into_job("red brick wall", now);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.created_at, now);
        assert_eq!(job.prompt, "red brick wall");
        assert!(job.variations.is_none());
    }

    #[test]
    fn payload_keeps_backend_fields() {
        let now = Utc::now();
        let payload: JobPayload = serde_json::from_value(serde_json::json!({
            "jobId": "j-9",
            "status": "pending",
            "prompt": "mossy stone"
        }))
        .unwrap();
        let job = payload.into_job("ignored", now);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.prompt, "mossy stone");
    }

    #[test]
    fn job_result_parses_with_optional_fields_missing() {
        let json = serde_json::json!({
            "jobId": "j-1",
            "previewImageUrl": "https://cdn/p.png",
            "highResImageUrl": "https://cdn/h.png",
            "prompt": "p",
            "createdAt": "2024-05-01T12:00:00Z",
            "tags": ["brick", "wall", "brick"],
            "isPublic": true,
            "resolution": "2048"
        });
        let result: JobResult = serde_json::from_value(json).unwrap();
        assert_eq!(result.tags.len(), 2);
        assert!(result.user_id.is_none());
        assert!(result.is_public);
    }

    #[test]
    fn finalization_produces_no_variations() {
        assert!(JobKind::Generation.produces_variations());
        assert!(JobKind::Modification.produces_variations());
        assert!(!JobKind::Finalization.produces_variations());
    }
}
