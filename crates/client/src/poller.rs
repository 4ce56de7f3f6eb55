//! Fixed-interval status polling for one active job.
//!
//! [`JobPoller::start`] spawns a task that probes `GET /ai/status/{id}`
//! immediately and then once per interval, feeding each status into a
//! [`JobLifecycle`]. The task stops on the first terminal status, probe
//! error, exhausted attempt budget, or cancellation. Starting a new poll
//! cancels the previous one, so at most one poll task is live per poller.
//!
//! Before committing a terminal state the task hands a [`Settlement`] to the
//! caller's `on_settled` hook, which may refuse it (the job was superseded
//! in the meantime); a refused settlement ends the poll as cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use texgen_core::job::{JobKind, JobResult, JobStatus};
use texgen_core::lifecycle::{JobLifecycle, PollPhase, PollStep};
use texgen_core::resolution::Resolution;
use texgen_core::types::JobId;

use crate::api::JobApi;
use crate::error::ClientError;
use crate::events::{EventBus, TextureEvent};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Poll cadence and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Interval for generation and modification jobs.
    pub interval: Duration,
    /// Interval for finalization (upscale) jobs.
    pub finalize_interval: Duration,
    /// Non-terminal statuses tolerated before giving up. `None` polls
    /// until a terminal status.
    pub max_attempts: Option<u32>,
}

impl PollSettings {
    pub fn interval_for(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Finalization => self.finalize_interval,
            JobKind::Generation | JobKind::Modification => self.interval,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            finalize_interval: Duration::from_secs(3),
            max_attempts: Some(360),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub job_id: JobId,
    pub kind: JobKind,
    /// Requested output size; only set for finalization.
    pub resolution: Option<Resolution>,
}

impl PollRequest {
    pub fn new(job_id: JobId, kind: JobKind) -> Self {
        Self {
            job_id,
            kind,
            resolution: None,
        }
    }
}

/// Terminal state offered to the `on_settled` hook before it is published.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub job_id: JobId,
    pub kind: JobKind,
    pub phase: PollPhase,
    pub variations: Vec<String>,
    pub result: Option<JobResult>,
}

/// How a poll ended when the backend reported a terminal status.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub job_id: JobId,
    pub kind: JobKind,
    /// `Completed` or `Failed`.
    pub status: JobStatus,
    pub variations: Vec<String>,
    /// `None` for failed jobs and when the result could not be fetched.
    pub result: Option<JobResult>,
    /// Every status observed, in order.
    pub observed: Vec<JobStatus>,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owner of a running poll. Dropping the handle cancels the poll.
pub struct PollHandle {
    job_id: JobId,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<PollOutcome, ClientError>>>,
}

impl PollHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that stops this poll, usable after the handle is moved away.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the poll to end.
    ///
    /// Backend-reported failure is `Ok` with `status == Failed`; probe
    /// errors, timeouts and cancellation are `Err`.
    pub async fn wait(mut self) -> Result<PollOutcome, ClientError> {
        let Some(task) = self.task.take() else {
            return Err(ClientError::Cancelled);
        };
        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(ClientError::Cancelled),
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

struct ActivePoll {
    id: u64,
    cancel: CancellationToken,
}

pub struct JobPoller {
    api: JobApi,
    events: EventBus,
    settings: PollSettings,
    active: Arc<Mutex<Option<ActivePoll>>>,
    next_id: AtomicU64,
}

impl JobPoller {
    pub fn new(api: JobApi, events: EventBus, settings: PollSettings) -> Self {
        Self {
            api,
            events,
            settings,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Whether a poll task is currently live.
    pub fn is_polling(&self) -> bool {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Cancel the live poll, if any.
    pub fn cancel_active(&self) {
        let previous = self.active.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    /// Start polling `request.job_id`, cancelling any previous poll first.
    ///
    /// `on_settled` runs once, on the poll task, before a terminal state is
    /// published; returning `false` discards the settlement.
    pub fn start<F>(&self, request: PollRequest, on_settled: F) -> PollHandle
    where
        F: FnOnce(&Settlement) -> bool + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = active.replace(ActivePoll {
                id,
                cancel: cancel.clone(),
            }) {
                previous.cancel.cancel();
            }
        }

        let task = PollTask {
            api: self.api.clone(),
            events: self.events.clone(),
            interval: self.settings.interval_for(request.kind),
            max_attempts: self.settings.max_attempts,
            cancel: cancel.clone(),
            request: request.clone(),
        };
        let active = Arc::clone(&self.active);
        let join = tokio::spawn(async move {
            let result = task.run(on_settled).await;
            let mut slot = active.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|a| a.id == id) {
                *slot = None;
            }
            result
        });

        PollHandle {
            job_id: request.job_id,
            cancel,
            task: Some(join),
        }
    }

    /// Poll to completion without a settlement hook.
    pub async fn poll(&self, request: PollRequest) -> Result<PollOutcome, ClientError> {
        self.start(request, |_| true).wait().await
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.cancel_active();
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

struct PollTask {
    api: JobApi,
    events: EventBus,
    interval: Duration,
    max_attempts: Option<u32>,
    cancel: CancellationToken,
    request: PollRequest,
}

impl PollTask {
    async fn run<F>(self, on_settled: F) -> Result<PollOutcome, ClientError>
    where
        F: FnOnce(&Settlement) -> bool,
    {
        let job_id = self.request.job_id.clone();
        let kind = self.request.kind;
        let mut lifecycle = JobLifecycle::polling(job_id.clone(), self.max_attempts);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(job_id = %job_id, kind = %kind, interval_secs = self.interval.as_secs(), "Polling job status");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                _ = ticker.tick() => {}
            }

            let probe = tokio::select! {
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                probe = self.api.get_status(&job_id) => probe,
            };

            let job = match probe {
                Ok(job) => job,
                Err(err) => {
                    tracing::warn!(job_id = %job_id, error = %err, "Status probe failed");
                    lifecycle.probe_failed(err.to_string())?;
                    let settlement = self.settlement(PollPhase::Failed, Vec::new(), None);
                    if !self.commit(on_settled, &settlement) {
                        return Err(self.cancelled());
                    }
                    self.events.publish(TextureEvent::ProbeFailed {
                        job_id,
                        kind,
                        message: err.to_string(),
                    });
                    return Err(err);
                }
            };

            match lifecycle.observe(job.status)? {
                PollStep::Continue { attempts } => {
                    tracing::debug!(job_id = %job_id, status = %job.status, attempts, "Job still running");
                    self.events.publish(TextureEvent::StatusChecked {
                        job_id: job_id.clone(),
                        kind,
                        status: job.status,
                        attempt: attempts,
                    });
                }
                PollStep::TimedOut { attempts } => {
                    tracing::warn!(job_id = %job_id, attempts, "Giving up on job");
                    let settlement = self.settlement(PollPhase::Failed, Vec::new(), None);
                    if !self.commit(on_settled, &settlement) {
                        return Err(self.cancelled());
                    }
                    self.events.publish(TextureEvent::TimedOut {
                        job_id: job_id.clone(),
                        kind,
                        attempts,
                    });
                    return Err(ClientError::Timeout { job_id, attempts });
                }
                PollStep::Failed => {
                    tracing::info!(job_id = %job_id, "Job failed");
                    let settlement = self.settlement(PollPhase::Failed, Vec::new(), None);
                    if !self.commit(on_settled, &settlement) {
                        return Err(self.cancelled());
                    }
                    self.events.publish(TextureEvent::JobFailed {
                        job_id: job_id.clone(),
                        kind,
                    });
                    return Ok(self.outcome(JobStatus::Failed, &lifecycle, settlement));
                }
                PollStep::Completed => {
                    let variations = job.variations.unwrap_or_default();
                    let result = self.fetch_result(&job_id).await?;
                    tracing::info!(job_id = %job_id, variations = variations.len(), "Job completed");

                    let settlement = self.settlement(PollPhase::Completed, variations, result);
                    if !self.commit(on_settled, &settlement) {
                        return Err(self.cancelled());
                    }
                    self.events.publish(TextureEvent::JobCompleted {
                        job_id: job_id.clone(),
                        kind,
                        variations: settlement.variations.clone(),
                        result: settlement.result.clone(),
                        resolution: self.request.resolution,
                    });
                    return Ok(self.outcome(JobStatus::Completed, &lifecycle, settlement));
                }
            }
        }
    }

    /// Fetch the result of a completed job.
    ///
    /// The completed status is authoritative, so a failed fetch only
    /// downgrades to `None` with a warning.
    async fn fetch_result(&self, job_id: &JobId) -> Result<Option<JobResult>, ClientError> {
        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return Err(self.cancelled()),
            fetched = self.api.get_result(job_id) => fetched,
        };
        match fetched {
            Ok(result) => Ok(Some(result)),
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "Could not fetch job result");
                self.events.publish(TextureEvent::ResultUnavailable {
                    job_id: job_id.clone(),
                    message: err.to_string(),
                });
                Ok(None)
            }
        }
    }

    fn settlement(
        &self,
        phase: PollPhase,
        variations: Vec<String>,
        result: Option<JobResult>,
    ) -> Settlement {
        Settlement {
            job_id: self.request.job_id.clone(),
            kind: self.request.kind,
            phase,
            variations,
            result,
        }
    }

    fn commit<F>(&self, on_settled: F, settlement: &Settlement) -> bool
    where
        F: FnOnce(&Settlement) -> bool,
    {
        !self.cancel.is_cancelled() && on_settled(settlement)
    }

    fn outcome(&self, status: JobStatus, lifecycle: &JobLifecycle, settlement: Settlement) -> PollOutcome {
        PollOutcome {
            job_id: settlement.job_id,
            kind: settlement.kind,
            status,
            variations: settlement.variations,
            result: settlement.result,
            observed: lifecycle.observed().to_vec(),
        }
    }

    fn cancelled(&self) -> ClientError {
        tracing::debug!(job_id = %self.request.job_id, "Poll cancelled");
        self.events.publish(TextureEvent::PollCancelled {
            job_id: self.request.job_id.clone(),
            kind: self.request.kind,
        });
        ClientError::Cancelled
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedClient;
    use crate::session::AuthSession;
    use crate::testing::{job, job_result, job_with_variations, json, Reply, StubTransport};
    use crate::transport::Method;
    use assert_matches::assert_matches;
    use tokio::sync::broadcast;

    const STATUS_J1: &str = "/ai/status/j1";

    fn poller(settings: PollSettings) -> (JobPoller, Arc<StubTransport>, broadcast::Receiver<TextureEvent>) {
        let stub = StubTransport::new();
        let session = AuthSession::new();
        session.set_tokens("a1", "r1");
        let api = JobApi::new(AuthenticatedClient::new(stub.clone(), session));
        let events = EventBus::default();
        let rx = events.subscribe();
        (JobPoller::new(api, events, settings), stub, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<TextureEvent>) -> Vec<TextureEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn request(id: &str) -> PollRequest {
        PollRequest::new(JobId::from(id), JobKind::Generation)
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_completed_and_fetches_result() {
        let (poller, stub, mut rx) = poller(PollSettings::default());
        stub.on(
            Method::Get,
            STATUS_J1,
            [
                job("j1", "pending"),
                job("j1", "processing"),
                job_with_variations("j1", &["a", "b", "c", "d"]),
            ],
        );
        stub.on(Method::Get, "/ai/job-results/j1", [job_result("j1")]);

        let outcome = poller.poll(request("j1")).await.unwrap();

        assert_eq!(outcome.status, JobStatus::Completed);
        assert_eq!(outcome.variations, ["a", "b", "c", "d"]);
        assert!(outcome.result.is_some());
        assert_eq!(
            outcome.observed,
            [JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]
        );
        assert_eq!(stub.count(Method::Get, STATUS_J1), 3);

        let events = drain(&mut rx);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_matches!(events.last(), Some(TextureEvent::JobCompleted { .. }));
        assert!(!poller.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn probes_immediately_then_every_interval() {
        let (poller, stub, _rx) = poller(PollSettings::default());
        stub.on(Method::Get, STATUS_J1, [job("j1", "processing")]);

        let handle = poller.start(request("j1"), |_| true);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(stub.count(Method::Get, STATUS_J1), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(stub.count(Method::Get, STATUS_J1), 2);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(stub.count(Method::Get, STATUS_J1), 4);
        drop(handle);
    }

    #[tokio::test(start_paused = true)]
    async fn finalization_uses_short_interval() {
        let (poller, stub, _rx) = poller(PollSettings::default());
        stub.on(Method::Get, STATUS_J1, [job("j1", "processing")]);

        let handle = poller.start(PollRequest::new(JobId::from("j1"), JobKind::Finalization), |_| true);
        tokio::time::sleep(Duration::from_millis(9_001)).await;
        assert_eq!(stub.count(Method::Get, STATUS_J1), 4);
        drop(handle);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_failure_is_an_outcome_not_an_error() {
        let (poller, stub, mut rx) = poller(PollSettings::default());
        stub.on(Method::Get, STATUS_J1, [job("j1", "processing"), job("j1", "failed")]);

        let outcome = poller.poll(request("j1")).await.unwrap();

        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(outcome.result.is_none());
        assert_eq!(stub.count(Method::Get, "/ai/job-results/j1"), 0);
        assert_matches!(drain(&mut rx).last(), Some(TextureEvent::JobFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_stops_polling() {
        let (poller, stub, mut rx) = poller(PollSettings::default());
        stub.on(
            Method::Get,
            STATUS_J1,
            [job("j1", "processing"), Reply::NetworkError("connection reset".into())],
        );

        let err = poller.poll(request("j1")).await.unwrap_err();
        assert_matches!(err, ClientError::Network(_));

        let events = drain(&mut rx);
        assert_matches!(events.last(), Some(TextureEvent::ProbeFailed { .. }));
        assert!(!events.iter().any(|e| matches!(e, TextureEvent::JobFailed { .. })));

        let probes = stub.count(Method::Get, STATUS_J1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(stub.count(Method::Get, STATUS_J1), probes);
    }

    #[tokio::test(start_paused = true)]
    async fn result_fetch_failure_keeps_job_completed() {
        let (poller, stub, mut rx) = poller(PollSettings::default());
        stub.on(Method::Get, STATUS_J1, [job_with_variations("j1", &["a"])]);
        stub.on(
            Method::Get,
            "/ai/job-results/j1",
            [json(500, serde_json::json!({"message": "storage offline"}))],
        );

        let outcome = poller.poll(request("j1")).await.unwrap();

        assert_eq!(outcome.status, JobStatus::Completed);
        assert!(outcome.result.is_none());
        assert_eq!(outcome.variations, ["a"]);
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, TextureEvent::ResultUnavailable { .. })));
        assert_matches!(events.last(), Some(TextureEvent::JobCompleted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_budget_ends_in_timeout() {
        let settings = PollSettings {
            max_attempts: Some(3),
            ..PollSettings::default()
        };
        let (poller, stub, mut rx) = poller(settings);
        stub.on(Method::Get, STATUS_J1, [job("j1", "processing")]);

        let err = poller.poll(request("j1")).await.unwrap_err();

        assert_matches!(err, ClientError::Timeout { attempts: 3, .. });
        assert_eq!(stub.count(Method::Get, STATUS_J1), 3);
        assert_matches!(drain(&mut rx).last(), Some(TextureEvent::TimedOut { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn new_poll_cancels_previous() {
        let (poller, stub, mut rx) = poller(PollSettings::default());
        stub.on(Method::Get, STATUS_J1, [job("j1", "processing")]);
        stub.on(Method::Get, "/ai/status/j2", [job("j2", "processing")]);

        let first = poller.start(request("j1"), |_| true);
        tokio::time::sleep(Duration::from_secs(11)).await;
        let probes_before = stub.count(Method::Get, STATUS_J1);
        assert_eq!(probes_before, 2);

        let second = poller.start(request("j2"), |_| true);
        assert_matches!(first.wait().await, Err(ClientError::Cancelled));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(stub.count(Method::Get, STATUS_J1), probes_before);
        assert!(stub.count(Method::Get, "/ai/status/j2") >= 6);
        assert!(poller.is_polling());

        let cancelled: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, TextureEvent::PollCancelled { .. }))
            .collect();
        assert_eq!(cancelled.len(), 1);
        drop(second);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_settlement_is_reported_as_cancelled() {
        let (poller, stub, mut rx) = poller(PollSettings::default());
        stub.on(Method::Get, STATUS_J1, [job_with_variations("j1", &["a"])]);
        stub.on(Method::Get, "/ai/job-results/j1", [job_result("j1")]);

        let result = poller.start(request("j1"), |_| false).wait().await;

        assert_matches!(result, Err(ClientError::Cancelled));
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, TextureEvent::JobCompleted { .. })));
        assert_matches!(events.last(), Some(TextureEvent::PollCancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_polling() {
        let (poller, stub, _rx) = poller(PollSettings::default());
        stub.on(Method::Get, STATUS_J1, [job("j1", "processing")]);

        let handle = poller.start(request("j1"), |_| true);
        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(stub.count(Method::Get, STATUS_J1), 1);
        assert!(!poller.is_polling());
    }
}
