//! Generate / modify / finalize / download, composed.
//!
//! [`GenerationOrchestrator`] owns the [`GenerationSession`], the
//! [`VariationStore`] and the single active poll. Preconditions and quota
//! are checked before any request is sent. Submitting a new job cancels
//! the previous poll before the request goes out.
//!
//! Each submission bumps an epoch under the state lock. A poll only commits
//! its terminal state if the epoch it was started under is still current,
//! so a superseded job can never overwrite newer state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use texgen_core::error::CoreError;
use texgen_core::job::{Job, JobKind, JobResult};
use texgen_core::lifecycle::PollPhase;
use texgen_core::reference::ReferenceImage;
use texgen_core::resolution::Resolution;
use texgen_core::session::{GenerationSession, PendingSubmission, SessionSummary};
use texgen_core::subscription::SubscriptionPlan;
use texgen_core::types::JobId;
use texgen_core::variation::{Variation, VariationId, VariationStore};

use crate::api::{DownloadedTexture, JobApi};
use crate::error::ClientError;
use crate::events::{EventBus, TextureEvent};
use crate::poller::{JobPoller, PollHandle, PollOutcome, PollRequest, PollSettings, Settlement};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    session: GenerationSession,
    variations: VariationStore,
    epoch: u64,
    active: Option<ActivePoll>,
}

struct ActivePoll {
    job_id: JobId,
    /// Stays here when the handle is taken so the poll can still be stopped.
    cancel: CancellationToken,
    /// Taken by `wait_for_job`.
    handle: Option<PollHandle>,
}

impl State {
    /// Cancel the current poll and invalidate any settlement in flight.
    fn supersede(&mut self) -> u64 {
        self.epoch += 1;
        if let Some(active) = self.active.take() {
            tracing::debug!(job_id = %active.job_id, "Cancelling superseded poll");
            active.cancel.cancel();
        }
        self.epoch
    }
}

/// Read-only view of the orchestrator for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorSnapshot {
    pub session: SessionSummary,
    pub variations: Vec<Variation>,
    pub selected_index: Option<usize>,
    pub current_texture: Option<String>,
    pub polling: bool,
    pub finalized: Option<JobResult>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct GenerationOrchestrator {
    api: JobApi,
    poller: JobPoller,
    events: EventBus,
    state: Arc<Mutex<State>>,
}

impl GenerationOrchestrator {
    pub fn new(api: JobApi, settings: PollSettings, plan: SubscriptionPlan) -> Self {
        let events = EventBus::default();
        let poller = JobPoller::new(api.clone(), events.clone(), settings);
        let state = State {
            session: GenerationSession::new(plan),
            ..State::default()
        };
        Self {
            api,
            poller,
            events,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TextureEvent> {
        self.events.subscribe()
    }

    pub fn set_plan(&self, plan: SubscriptionPlan) {
        self.lock().session.set_plan(plan);
    }

    // ---- operations ----

    /// Submit a new generation and start polling it.
    ///
    /// Needs a prompt or at least one reference image. Any generation after
    /// the first successful one consumes modification quota.
    pub async fn generate(
        &self,
        prompt: &str,
        reference_images: Vec<ReferenceImage>,
    ) -> Result<Job, ClientError> {
        let (submission, epoch) = {
            let mut state = self.lock();
            let submission = self.checked(
                JobKind::Generation,
                state.session.validate_generation(prompt, reference_images.len()),
            )?;
            let epoch = state.supersede();
            state.session.begin_submission()?;
            state.session.set_prompt(prompt);
            state.session.record_prompt(prompt);
            state.session.clear_reference_images();
            state.session.add_reference_images(reference_images.clone())?;
            state.variations.reset();
            (submission, epoch)
        };

        let submitted = self.api.submit_generation(prompt, &reference_images).await;
        self.track(submission, epoch, submitted, None)
    }

    /// Submit a modification of the active job and start polling it.
    pub async fn modify(&self, prompt: &str) -> Result<Job, ClientError> {
        let (submission, source, epoch) = {
            let mut state = self.lock();
            let submission = self.checked(
                JobKind::Modification,
                state.session.validate_modification(prompt),
            )?;
            let source = source_of(&submission)?;
            let epoch = state.supersede();
            state.session.begin_submission()?;
            state.session.set_prompt(prompt);
            state.session.record_prompt(prompt);
            state.variations.reset();
            (submission, source, epoch)
        };

        let submitted = self.api.submit_modification(&source, prompt).await;
        self.track(submission, epoch, submitted, None)
    }

    /// Upscale the active job at `resolution` and start polling it.
    pub async fn finalize(&self, resolution: Resolution) -> Result<Job, ClientError> {
        let (submission, source, epoch) = {
            let mut state = self.lock();
            let submission = self.checked(
                JobKind::Finalization,
                state.session.validate_finalization(resolution),
            )?;
            let source = source_of(&submission)?;
            state.session.set_resolution(resolution)?;
            let epoch = state.supersede();
            state.session.begin_submission()?;
            (submission, source, epoch)
        };

        let submitted = self.api.submit_finalization(&source).await;
        self.track(submission, epoch, submitted, Some(resolution))
    }

    /// Fetch the finished texture for `job_id`.
    ///
    /// Without a signed-in session this fails with
    /// [`ClientError::AuthRequired`] and sends nothing.
    pub async fn download(&self, job_id: &JobId) -> Result<DownloadedTexture, ClientError> {
        match self.api.download(job_id).await {
            Ok(texture) => {
                self.events.publish(TextureEvent::Downloaded {
                    job_id: job_id.clone(),
                    bytes: texture.bytes.len(),
                });
                Ok(texture)
            }
            Err(ClientError::AuthRequired) => {
                self.events.publish(TextureEvent::SignInRequired {
                    action: "download".to_string(),
                });
                Err(ClientError::AuthRequired)
            }
            Err(err) => {
                self.events.publish(TextureEvent::DownloadFailed {
                    job_id: job_id.clone(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Select a variation by position. Out-of-range indices are ignored.
    pub fn select_variation(&self, index: usize) -> bool {
        let mut state = self.lock();
        let changed = state.variations.select_variation(index);
        if changed {
            self.publish_selection(&state.variations);
        }
        changed
    }

    pub fn select_variation_by_id(&self, id: VariationId) -> bool {
        let mut state = self.lock();
        let changed = state.variations.select_by_id(id);
        if changed {
            self.publish_selection(&state.variations);
        }
        changed
    }

    /// Wait for the active poll to end.
    ///
    /// Fails with a validation error when nothing is being polled or
    /// another caller is already waiting.
    pub async fn wait_for_job(&self) -> Result<PollOutcome, ClientError> {
        let handle = {
            let mut state = self.lock();
            state.active.as_mut().and_then(|active| {
                tracing::debug!(job_id = %active.job_id, "Waiting for job to settle");
                active.handle.take()
            })
        };
        let Some(handle) = handle else {
            return Err(CoreError::Validation("No job is being polled".to_string()).into());
        };
        handle.wait().await
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        let state = self.lock();
        let polling = state.session.active_job().is_some_and(|job| job.phase == PollPhase::Polling)
            && self.poller.is_polling();
        OrchestratorSnapshot {
            session: state.session.summary(),
            variations: state.variations.variations().to_vec(),
            selected_index: state.variations.selected_index(),
            current_texture: state.variations.current_texture().map(str::to_string),
            polling,
            finalized: state.session.finalized().cloned(),
        }
    }

    /// Stop polling. Later settlements of the cancelled job are discarded.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.supersede();
        if state.session.phase() == PollPhase::Submitted {
            if let Err(transition) = state.session.reject_submission() {
                tracing::warn!(error = %transition, "Submission was not in flight");
            }
        }
        drop(state);
        self.poller.cancel_active();
    }

    // ---- private helpers ----

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Surface a precondition failure as an event before returning it.
    fn checked(
        &self,
        kind: JobKind,
        validated: Result<PendingSubmission, CoreError>,
    ) -> Result<PendingSubmission, ClientError> {
        validated.map_err(|err| {
            tracing::info!(kind = %kind, error = %err, "Request rejected before sending");
            self.events.publish(TextureEvent::Rejected {
                kind,
                message: err.to_string(),
            });
            ClientError::from(err)
        })
    }

    /// Record a submission outcome and, on success, start polling.
    fn track(
        &self,
        submission: PendingSubmission,
        epoch: u64,
        submitted: Result<Job, ClientError>,
        resolution: Option<Resolution>,
    ) -> Result<Job, ClientError> {
        let kind = submission.kind;
        let mut state = self.lock();

        let job = match submitted {
            Ok(job) => job,
            Err(err) => {
                tracing::warn!(kind = %kind, error = %err, "Submission failed");
                if state.epoch == epoch {
                    if let Err(transition) = state.session.reject_submission() {
                        tracing::warn!(error = %transition, "Submission was not in flight");
                    }
                }
                self.events.publish(TextureEvent::SubmissionFailed {
                    kind,
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        if state.epoch != epoch {
            tracing::info!(job_id = %job.job_id, "Submission superseded before it was accepted");
            return Err(ClientError::Cancelled);
        }

        state.session.accept_submission(&submission, job.job_id.clone())?;
        let request = PollRequest {
            job_id: job.job_id.clone(),
            kind,
            resolution,
        };
        let handle = self.poller.start(request, self.settle_hook(epoch));
        state.active = Some(ActivePoll {
            job_id: job.job_id.clone(),
            cancel: handle.cancellation(),
            handle: Some(handle),
        });
        drop(state);

        self.events.publish(TextureEvent::JobSubmitted {
            job_id: job.job_id.clone(),
            kind,
        });
        Ok(job)
    }

    /// Commit a terminal state if `epoch` is still current.
    fn settle_hook(&self, epoch: u64) -> impl FnOnce(&Settlement) -> bool + Send + 'static {
        let state = Arc::clone(&self.state);
        move |settlement: &Settlement| {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.epoch != epoch {
                return false;
            }
            let produced = !settlement.variations.is_empty();
            state
                .session
                .settle(&settlement.job_id, settlement.phase, produced);
            if settlement.phase == PollPhase::Completed {
                if settlement.kind.produces_variations() {
                    state.variations.set_initial_variations(&settlement.variations);
                }
                if settlement.kind == JobKind::Finalization {
                    if let Some(result) = &settlement.result {
                        state.session.set_finalized(result.clone());
                    }
                }
            }
            true
        }
    }

    fn publish_selection(&self, variations: &VariationStore) {
        if let (Some(index), Some(selected)) = (variations.selected_index(), variations.selected()) {
            self.events.publish(TextureEvent::VariationSelected {
                index,
                image_url: selected.image_url.clone(),
            });
        }
    }
}

fn source_of(submission: &PendingSubmission) -> Result<JobId, ClientError> {
    submission
        .source_job
        .clone()
        .ok_or_else(|| CoreError::Validation("No current job to build on".to_string()).into())
}

impl Drop for GenerationOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
