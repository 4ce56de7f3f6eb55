//! Lifecycle events broadcast to front-ends.
//!
//! Every user-visible outcome (preview ready, job failed, download done)
//! is published as a [`TextureEvent`]. Front-ends render
//! [`TextureEvent::notice`] however they like; the CLI prints it.

use serde::Serialize;
use tokio::sync::broadcast;

use texgen_core::job::{JobKind, JobResult, JobStatus};
use texgen_core::resolution::Resolution;
use texgen_core::types::JobId;

// ---------------------------------------------------------------------------
// TextureEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextureEvent {
    /// A request failed local validation and was not sent.
    Rejected { kind: JobKind, message: String },

    /// The backend accepted a job and polling started.
    JobSubmitted { job_id: JobId, kind: JobKind },

    /// The submit request itself failed.
    SubmissionFailed { kind: JobKind, message: String },

    /// A status probe saw a non-terminal status.
    StatusChecked {
        job_id: JobId,
        kind: JobKind,
        status: JobStatus,
        attempt: u32,
    },

    JobCompleted {
        job_id: JobId,
        kind: JobKind,
        variations: Vec<String>,
        result: Option<JobResult>,
        /// Requested output size, for finalization jobs.
        resolution: Option<Resolution>,
    },

    /// The backend reported the job as failed.
    JobFailed { job_id: JobId, kind: JobKind },

    /// The status probe errored; polling stopped.
    ProbeFailed {
        job_id: JobId,
        kind: JobKind,
        message: String,
    },

    /// Polling ran out of attempts.
    TimedOut {
        job_id: JobId,
        kind: JobKind,
        attempts: u32,
    },

    /// Polling stopped because the job was superseded or the client shut down.
    PollCancelled { job_id: JobId, kind: JobKind },

    /// The job completed but its result could not be fetched.
    ResultUnavailable { job_id: JobId, message: String },

    VariationSelected { index: usize, image_url: String },

    Downloaded { job_id: JobId, bytes: usize },

    DownloadFailed { job_id: JobId, message: String },

    /// The action needs a signed-in account; nothing was sent.
    SignInRequired { action: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A short user-facing message derived from an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Notice {
    fn new(level: NoticeLevel, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: None,
        }
    }

    fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

const RETRY_HINT: &str = "Please try again with a different prompt.";

impl TextureEvent {
    /// The notice a front-end should show, if any.
    pub fn notice(&self) -> Option<Notice> {
        use NoticeLevel::*;

        let notice = match self {
            Self::Rejected { message, .. } => Notice::new(Error, message.clone()),
            Self::SubmissionFailed { kind, message } => {
                let title = match kind {
                    JobKind::Generation => "Failed to generate texture",
                    JobKind::Modification => "Failed to modify texture",
                    JobKind::Finalization => "Failed to finalize texture",
                };
                Notice::new(Error, title).describe(message.clone())
            }
            Self::JobCompleted {
                kind, resolution, ..
            } => match kind {
                JobKind::Generation => Notice::new(Success, "Texture preview generated!")
                    .describe("Select one of the variations or modify the prompt."),
                JobKind::Modification => Notice::new(Success, "Texture preview modified!")
                    .describe("Select one of the variations or modify the prompt again."),
                JobKind::Finalization => {
                    let label = resolution.map(Resolution::label).unwrap_or_else(|| "Final".into());
                    Notice::new(Success, format!("{label} texture generated!"))
                        .describe("Your texture has been added to the gallery.")
                }
            },
            Self::JobFailed { kind, .. } => match kind {
                JobKind::Generation => Notice::new(Error, "Generation failed").describe(RETRY_HINT),
                JobKind::Modification => {
                    Notice::new(Error, "Modification failed").describe(RETRY_HINT)
                }
                JobKind::Finalization => Notice::new(Error, "Failed to finalize texture"),
            },
            Self::ProbeFailed { kind, .. } => {
                Notice::new(Error, format!("Error checking {} status", kind.as_str()))
            }
            Self::TimedOut { kind, attempts, .. } => {
                Notice::new(Error, format!("The {} is taking too long", kind.as_str()))
                    .describe(format!("Stopped checking after {attempts} attempts."))
            }
            Self::ResultUnavailable { message, .. } => {
                Notice::new(Warning, "Texture details unavailable").describe(message.clone())
            }
            Self::Downloaded { .. } => Notice::new(Success, "Texture downloaded successfully"),
            Self::DownloadFailed { message, .. } => {
                Notice::new(Error, "Failed to download texture").describe(message.clone())
            }
            Self::SignInRequired { action } => {
                Notice::new(Info, "Sign in required").describe(format!("Sign in to {action}"))
            }
            Self::JobSubmitted { .. }
            | Self::StatusChecked { .. }
            | Self::PollCancelled { .. }
            | Self::VariationSelected { .. } => return None,
        };
        Some(notice)
    }

    /// Whether this event ends a poll.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::JobCompleted { .. }
                | Self::JobFailed { .. }
                | Self::ProbeFailed { .. }
                | Self::TimedOut { .. }
                | Self::PollCancelled { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of [`TextureEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TextureEvent>,
}

impl EventBus {
    /// Slow receivers past `capacity` observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: TextureEvent) {
        // Zero receivers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TextureEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
