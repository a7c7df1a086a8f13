//! Polling driver for asynchronous remote jobs.
//!
//! Export, import, release, ETL and evaluation jobs all run remotely and report
//! a [`JobStatus`]. [`await_completion`] drives any of them to a terminal state
//! with the same semantics; only the status fetch differs per job kind.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::error::DataportError;

/// Status reported by a remote job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Finished,
    Failed,
    Interrupted,
}

impl JobStatus {
    /// Finished, Failed and Interrupted end a job.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Failed | JobStatus::Interrupted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Running => "Running",
            JobStatus::Paused => "Paused",
            JobStatus::Finished => "Finished",
            JobStatus::Failed => "Failed",
            JobStatus::Interrupted => "Interrupted",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of remote job, used for intervals and error context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobKind {
    Export,
    Import,
    Release,
    Etl,
    Evaluation,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Export => "export",
            JobKind::Import => "import",
            JobKind::Release => "release",
            JobKind::Etl => "etl",
            JobKind::Evaluation => "evaluation",
        };
        f.write_str(name)
    }
}

/// One observation of a job: its status and, once finished, its result.
#[derive(Clone, Debug, PartialEq)]
pub struct JobState<T> {
    pub status: JobStatus,
    pub payload: Option<T>,
}

impl<T> JobState<T> {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            payload: None,
        }
    }

    pub fn with_payload(status: JobStatus, payload: T) -> Self {
        Self {
            status,
            payload: Some(payload),
        }
    }
}

/// Shared flag a caller flips to abandon a job wait.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How to wait for a job.
#[derive(Clone, Debug)]
pub struct PollOptions {
    pub interval: Duration,
    /// Give up after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl PollOptions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            cancel: None,
        }
    }

    /// Interval and timeout for `kind` as configured.
    pub fn from_config(config: &TransferConfig, kind: JobKind) -> Self {
        Self {
            interval: config.poll_interval(kind),
            timeout: config.poll_timeout,
            cancel: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Poll `fetch` until the job reaches a terminal state.
///
/// Returns the payload of a Finished job. Failed and Interrupted jobs become
/// [`DataportError::JobFailed`]. Pending, Running and Paused keep the loop going;
/// Paused is logged as a warning. Errors from `fetch` itself propagate as-is.
pub fn await_completion<T, F>(
    kind: JobKind,
    job_id: &str,
    mut fetch: F,
    options: &PollOptions,
) -> Result<Option<T>, DataportError>
where
    F: FnMut(&str) -> Result<JobState<T>, DataportError>,
{
    let started = Instant::now();
    let mut polls: u32 = 0;

    loop {
        if options.is_cancelled() {
            return Err(DataportError::Cancelled {
                kind,
                job_id: job_id.to_string(),
            });
        }

        let state = fetch(job_id)?;
        polls += 1;

        match state.status {
            JobStatus::Finished => {
                info!(%kind, job_id, polls, "job finished");
                return Ok(state.payload);
            }
            JobStatus::Failed | JobStatus::Interrupted => {
                warn!(%kind, job_id, status = %state.status, "job terminated");
                return Err(DataportError::JobFailed {
                    kind,
                    job_id: job_id.to_string(),
                    status: state.status,
                });
            }
            JobStatus::Paused => {
                warn!(%kind, job_id, "job paused, keep polling");
            }
            JobStatus::Pending | JobStatus::Running => {
                debug!(%kind, job_id, status = %state.status, "keep polling");
            }
        }

        let mut wait = options.interval;
        if let Some(timeout) = options.timeout {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(DataportError::JobTimedOut {
                    kind,
                    job_id: job_id.to_string(),
                    status: state.status,
                    elapsed_secs: elapsed.as_secs_f64(),
                });
            }
            wait = wait.min(timeout - elapsed);
        }

        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}
