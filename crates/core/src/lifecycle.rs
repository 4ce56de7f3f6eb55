//! Per-job polling state machine.
//!
//! `Idle -> Submitted -> Polling -> {Completed, Failed}`.
//!
//! The submit half (`Idle -> Submitted -> Polling | Idle`) is driven by the
//! generation session around each submit request. The polling half is
//! stepped by the poller once per tick with the status the backend reported.
//! It never sleeps or performs I/O, so every transition can be exercised
//! without timers.

use std::fmt;

use serde::Serialize;

use crate::error::CoreError;
use crate::job::JobStatus;
use crate::types::JobId;

/// Phase of the job lifecycle as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollPhase {
    Idle,
    Submitted,
    Polling,
    Completed,
    Failed,
}

impl PollPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a lifecycle ended in [`PollPhase::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The backend reported `failed`.
    Backend,
    /// The status probe itself errored (network, auth, decoding).
    Probe(String),
    /// The attempt budget ran out before a terminal status.
    TimedOut { attempts: u32 },
}

/// What the poller should do after feeding a status into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    /// Job still pending/processing; schedule another tick.
    Continue { attempts: u32 },
    /// Job completed; stop polling and fetch results.
    Completed,
    /// Backend reported failure; stop polling.
    Failed,
    /// Attempt budget exhausted; stop polling.
    TimedOut { attempts: u32 },
}

/// State machine for a single job.
#[derive(Debug, Clone)]
pub struct JobLifecycle {
    phase: PollPhase,
    job_id: Option<JobId>,
    attempts: u32,
    max_attempts: Option<u32>,
    observed: Vec<JobStatus>,
    failure: Option<FailureCause>,
}

impl JobLifecycle {
    /// A fresh lifecycle in [`PollPhase::Idle`].
    ///
    /// `max_attempts` bounds the number of non-terminal statuses accepted
    /// before the job is considered timed out; `None` polls indefinitely.
    pub fn new(max_attempts: Option<u32>) -> Self {
        Self {
            phase: PollPhase::Idle,
            job_id: None,
            attempts: 0,
            max_attempts,
            observed: Vec::new(),
            failure: None,
        }
    }

    /// Shortcut for a job whose submission already succeeded.
    pub fn polling(job_id: JobId, max_attempts: Option<u32>) -> Self {
        let mut lifecycle = Self::new(max_attempts);
        lifecycle.phase = PollPhase::Polling;
        lifecycle.job_id = Some(job_id);
        lifecycle
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    /// Number of non-terminal statuses observed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Every status fed into the machine, in order.
    pub fn observed(&self) -> &[JobStatus] {
        &self.observed
    }

    pub fn failure(&self) -> Option<&FailureCause> {
        self.failure.as_ref()
    }

    /// `Idle -> Submitted`: a submit request is about to be sent.
    pub fn begin_submission(&mut self) -> Result<(), CoreError> {
        self.transition(PollPhase::Idle, PollPhase::Submitted)
    }

    /// `Submitted -> Polling`: the backend accepted the job.
    pub fn accept(&mut self, job_id: JobId) -> Result<(), CoreError> {
        self.transition(PollPhase::Submitted, PollPhase::Polling)?;
        self.job_id = Some(job_id);
        Ok(())
    }

    /// `Submitted -> Idle`: the submit request failed; nothing is tracked.
    pub fn reject(&mut self) -> Result<(), CoreError> {
        self.transition(PollPhase::Submitted, PollPhase::Idle)
    }

    /// Feed one status probe result into the machine.
    pub fn observe(&mut self, status: JobStatus) -> Result<PollStep, CoreError> {
        if self.phase != PollPhase::Polling {
            let to = if status.is_terminal() {
                terminal_phase(status)
            } else {
                PollPhase::Polling
            };
            return Err(CoreError::InvalidTransition {
                from: self.phase,
                to,
            });
        }

        self.observed.push(status);
        match status {
            JobStatus::Pending | JobStatus::Processing => {
                self.attempts += 1;
                match self.max_attempts {
                    Some(max) if self.attempts >= max => {
                        self.fail(FailureCause::TimedOut {
                            attempts: self.attempts,
                        });
                        Ok(PollStep::TimedOut {
                            attempts: self.attempts,
                        })
                    }
                    _ => Ok(PollStep::Continue {
                        attempts: self.attempts,
                    }),
                }
            }
            JobStatus::Completed => {
                self.phase = PollPhase::Completed;
                Ok(PollStep::Completed)
            }
            JobStatus::Failed => {
                self.fail(FailureCause::Backend);
                Ok(PollStep::Failed)
            }
        }
    }

    /// `Polling -> Failed` because the status probe errored.
    pub fn probe_failed(&mut self, reason: impl Into<String>) -> Result<(), CoreError> {
        if self.phase != PollPhase::Polling {
            return Err(CoreError::InvalidTransition {
                from: self.phase,
                to: PollPhase::Failed,
            });
        }
        self.fail(FailureCause::Probe(reason.into()));
        Ok(())
    }

    fn fail(&mut self, cause: FailureCause) {
        self.phase = PollPhase::Failed;
        self.failure = Some(cause);
    }

    fn transition(&mut self, from: PollPhase, to: PollPhase) -> Result<(), CoreError> {
        if self.phase != from {
            return Err(CoreError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }
}

impl Default for JobLifecycle {
    fn default() -> Self {
        Self::new(None)
    }
}

fn terminal_phase(status: JobStatus) -> PollPhase {
    match status {
        JobStatus::Completed => PollPhase::Completed,
        _ => PollPhase::Failed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
