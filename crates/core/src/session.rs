//! Generation session bookkeeping.
//!
//! A [`GenerationSession`] is the aggregate behind one editing session: the
//! prompt and its history, the job currently being worked on, how many
//! generations and modifications have happened, the chosen output
//! resolution, attached reference images, and the last finalized result.
//!
//! All precondition checks for generate/modify/finalize live here so they
//! run before anything touches the network.

use serde::Serialize;

use crate::error::CoreError;
use crate::job::{JobKind, JobResult};
use crate::lifecycle::{JobLifecycle, PollPhase};
use crate::reference::{validate_reference_count, ReferenceImage};
use crate::resolution::Resolution;
use crate::subscription::SubscriptionPlan;
use crate::types::JobId;

// ---------------------------------------------------------------------------
// Active job
// ---------------------------------------------------------------------------

/// The job the session is currently tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJob {
    pub job_id: JobId,
    pub kind: JobKind,
    pub phase: PollPhase,
}

/// A validated request that has not been sent yet.
///
/// Returned by the `validate_*` methods and handed back to
/// [`GenerationSession::accept_submission`] once the backend accepted it.
/// The request itself is bracketed by [`GenerationSession::begin_submission`]
/// and either `accept_submission` or `reject_submission`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    pub kind: JobKind,
    /// Job the request builds on (modification and finalization only).
    pub source_job: Option<JobId>,
    /// Whether a successful submission consumes modification quota.
    pub counts_as_modification: bool,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct GenerationSession {
    plan: SubscriptionPlan,
    prompt: String,
    prompt_history: Vec<String>,
    active_job: Option<ActiveJob>,
    /// Submit half of the lifecycle: `Idle -> Submitted -> Polling | Idle`.
    submission: JobLifecycle,
    generation_count: u32,
    modification_count: u32,
    confirmed: bool,
    resolution: Resolution,
    reference_images: Vec<ReferenceImage>,
    finalized: Option<JobResult>,
}

impl GenerationSession {
    pub fn new(plan: SubscriptionPlan) -> Self {
        Self {
            plan,
            ..Self::default()
        }
    }

    // -- accessors --

    pub fn plan(&self) -> SubscriptionPlan {
        self.plan
    }

    /// Plan changes (e.g. after login) take effect for the next check.
    pub fn set_plan(&mut self, plan: SubscriptionPlan) {
        self.plan = plan;
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn prompt_history(&self) -> &[String] {
        &self.prompt_history
    }

    pub fn active_job(&self) -> Option<&ActiveJob> {
        self.active_job.as_ref()
    }

    pub fn active_job_id(&self) -> Option<&JobId> {
        self.active_job.as_ref().map(|job| &job.job_id)
    }

    /// `Submitted` while a submit request is in flight, otherwise the phase
    /// of the active job (`Idle` when there is none).
    pub fn phase(&self) -> PollPhase {
        if self.submission.phase() == PollPhase::Submitted {
            return PollPhase::Submitted;
        }
        self.active_job
            .as_ref()
            .map_or(PollPhase::Idle, |job| job.phase)
    }

    /// Completed jobs that produced variations.
    pub fn generation_count(&self) -> u32 {
        self.generation_count
    }

    pub fn modification_count(&self) -> u32 {
        self.modification_count
    }

    pub fn remaining_modifications_label(&self) -> String {
        self.plan.remaining_label(self.modification_count)
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn reference_images(&self) -> &[ReferenceImage] {
        &self.reference_images
    }

    pub fn finalized(&self) -> Option<&JobResult> {
        self.finalized.as_ref()
    }

    // -- inputs --

    /// Append to the history unless blank or already present.
    pub fn record_prompt(&mut self, prompt: &str) {
        if prompt.trim().is_empty() || self.prompt_history.iter().any(|p| p == prompt) {
            return;
        }
        self.prompt_history.push(prompt.to_string());
    }

    pub fn add_reference_images(&mut self, images: Vec<ReferenceImage>) -> Result<(), CoreError> {
        validate_reference_count(self.reference_images.len(), images.len())?;
        self.reference_images.extend(images);
        Ok(())
    }

    /// Remove the image at `index`; out-of-range indices are ignored.
    pub fn remove_reference_image(&mut self, index: usize) -> Option<ReferenceImage> {
        (index < self.reference_images.len()).then(|| self.reference_images.remove(index))
    }

    pub fn clear_reference_images(&mut self) {
        self.reference_images.clear();
    }

    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<(), CoreError> {
        resolution.check_available(self.plan)?;
        self.resolution = resolution;
        Ok(())
    }

    // -- preconditions --

    /// A generation needs a prompt or at least one reference image.
    ///
    /// Any generation after the first successful one is a regeneration and
    /// is charged against the modification quota.
    pub fn validate_generation(
        &self,
        prompt: &str,
        reference_count: usize,
    ) -> Result<PendingSubmission, CoreError> {
        if prompt.trim().is_empty() && reference_count == 0 {
            return Err(CoreError::Validation(
                "Please provide a text prompt or reference image".to_string(),
            ));
        }
        validate_reference_count(0, reference_count)?;

        let counts_as_modification = self.generation_count > 0;
        if counts_as_modification {
            self.plan.check_modification(self.modification_count)?;
        }
        Ok(PendingSubmission {
            kind: JobKind::Generation,
            source_job: None,
            counts_as_modification,
        })
    }

    /// A modification needs a prompt and a job to modify.
    pub fn validate_modification(&self, prompt: &str) -> Result<PendingSubmission, CoreError> {
        if prompt.trim().is_empty() {
            return Err(CoreError::Validation(
                "Please provide a text prompt to modify the texture".to_string(),
            ));
        }
        let source = self.active_job_id().cloned().ok_or_else(|| {
            CoreError::Validation("There is no texture to modify yet".to_string())
        })?;
        self.plan.check_modification(self.modification_count)?;
        Ok(PendingSubmission {
            kind: JobKind::Modification,
            source_job: Some(source),
            counts_as_modification: true,
        })
    }

    /// Finalization needs a job that has not failed and a resolution the
    /// plan includes.
    pub fn validate_finalization(
        &self,
        resolution: Resolution,
    ) -> Result<PendingSubmission, CoreError> {
        let job = self.active_job.as_ref().ok_or_else(|| {
            CoreError::Validation("No current job to finalize".to_string())
        })?;
        if job.phase == PollPhase::Failed {
            return Err(CoreError::Validation(format!(
                "Job {} failed and cannot be finalized",
                job.job_id
            )));
        }
        resolution.check_available(self.plan)?;
        Ok(PendingSubmission {
            kind: JobKind::Finalization,
            source_job: Some(job.job_id.clone()),
            counts_as_modification: false,
        })
    }

    // -- lifecycle --

    /// A submit request is about to be sent.
    ///
    /// Starts a fresh submission, replacing one still in flight. The active
    /// job is no longer polled from here on, so a non-terminal one drops to
    /// `Idle`.
    pub fn begin_submission(&mut self) -> Result<(), CoreError> {
        self.submission = JobLifecycle::default();
        self.submission.begin_submission()?;
        if let Some(job) = self.active_job.as_mut() {
            if !job.phase.is_terminal() {
                job.phase = PollPhase::Idle;
            }
        }
        Ok(())
    }

    /// Record that the backend accepted `submission` as `job_id`.
    ///
    /// The accepted job replaces the active one and starts polling.
    pub fn accept_submission(
        &mut self,
        submission: &PendingSubmission,
        job_id: JobId,
    ) -> Result<(), CoreError> {
        self.submission.accept(job_id.clone())?;
        if submission.counts_as_modification {
            self.modification_count += 1;
        }
        if submission.kind == JobKind::Generation {
            self.confirmed = false;
        }
        self.active_job = Some(ActiveJob {
            job_id,
            kind: submission.kind,
            phase: PollPhase::Polling,
        });
        Ok(())
    }

    /// The submit request failed; the previous job (if any) stays current
    /// but is no longer being polled.
    pub fn reject_submission(&mut self) -> Result<(), CoreError> {
        self.submission.reject()
    }

    /// Record the terminal phase of `job_id`.
    ///
    /// Ignored unless `job_id` is still the active job. Returns whether the
    /// session changed.
    pub fn settle(&mut self, job_id: &JobId, phase: PollPhase, produced_variations: bool) -> bool {
        let Some(job) = self.active_job.as_mut().filter(|job| &job.job_id == job_id) else {
            return false;
        };
        if job.phase.is_terminal() {
            return false;
        }
        job.phase = phase;
        if phase == PollPhase::Completed {
            if job.kind.produces_variations() && produced_variations {
                self.generation_count += 1;
            }
            if job.kind == JobKind::Finalization {
                self.confirmed = true;
            }
        }
        true
    }

    pub fn set_finalized(&mut self, result: JobResult) {
        self.finalized = Some(result);
    }

    /// Snapshot for display.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            prompt: self.prompt.clone(),
            prompt_history: self.prompt_history.clone(),
            active_job: self.active_job.clone(),
            phase: self.phase(),
            generation_count: self.generation_count,
            modification_count: self.modification_count,
            remaining_modifications: self.remaining_modifications_label(),
            confirmed: self.confirmed,
            resolution: self.resolution,
            reference_image_count: self.reference_images.len(),
            plan: self.plan,
        }
    }
}

/// Serializable view of a [`GenerationSession`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub prompt: String,
    pub prompt_history: Vec<String>,
    pub active_job: Option<ActiveJob>,
    pub phase: PollPhase,
    pub generation_count: u32,
    pub modification_count: u32,
    pub remaining_modifications: String,
    pub confirmed: bool,
    pub resolution: Resolution,
    pub reference_image_count: usize,
    pub plan: SubscriptionPlan,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
