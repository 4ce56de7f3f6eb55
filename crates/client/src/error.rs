//! Error taxonomy for the HTTP client side.

use texgen_core::error::CoreError;
use texgen_core::types::JobId;

/// Errors surfaced by the client, the poller and the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A local precondition failed; nothing was sent.
    #[error("{0}")]
    Validation(#[from] CoreError),

    /// The backend answered with a non-2xx status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The referenced job does not exist upstream.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The action needs a signed-in session.
    #[error("Authentication required")]
    AuthRequired,

    /// The request never produced a response (connect, DNS, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// A response body did not have the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Polling gave up before the job reached a terminal status.
    #[error("Job {job_id} did not finish after {attempts} status checks")]
    Timeout { job_id: JobId, attempts: u32 },

    /// The operation was superseded or the client shut down.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Best-effort error message for a failed response.
///
/// A JSON body yields its `message` field; a non-JSON body yields its raw
/// text; otherwise `Error <status>`.
pub fn extract_error_message(status: u16, body: &[u8]) -> String {
    let fallback = || format!("Error {status}");
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(json) => json
            .get("message")
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(fallback),
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            if text.is_empty() {
                fallback()
            } else {
                text.to_string()
            }
        }
    }
}
