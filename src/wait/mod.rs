//! Polling a launched job until it reaches a terminal state.
//!
//! The first status fetch happens immediately. Between fetches the waiter
//! sleeps one poll interval and then checks the deadline, so the timeout is
//! only observed at interval boundaries. Cancellation interrupts both the
//! sleep and any in-flight fetch.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::remote::{AutomationApi, JobSnapshot, JobStatus, LaunchedJob, RemoteError};

/// Upper bound on the best-effort output fetch after a failure.
pub const DEFAULT_OUTPUT_GRACE: Duration = Duration::from_secs(10);

const OUTPUT_TAIL_LINES: usize = 20;

/// Terminal result of waiting for a job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WaitOutcome {
    /// The job reported `successful`.
    Succeeded(JobSnapshot),
    /// The job failed or could not be polled.
    Failed(JobFailure),
    /// The job was still running when the deadline passed.
    TimedOut {
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// The wait was cancelled.
    Cancelled,
}

/// Why a wait ended in [`WaitOutcome::Failed`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobFailure {
    /// The controller reported a failed, errored, or cancelled job.
    Reported {
        /// Last snapshot observed.
        snapshot: JobSnapshot,
        /// Explanation or tail of the job output, when available.
        detail: Option<String>,
    },
    /// A status fetch failed.
    Poll(RemoteError),
}

/// Races `future` against `token`, mapping cancellation onto
/// [`RemoteError::Cancelled`]. Dropping the losing future aborts the
/// in-flight request.
///
/// # Errors
///
/// Returns the future's own error, or [`RemoteError::Cancelled`].
pub async fn cancellable<T, F>(token: &CancellationToken, future: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(RemoteError::Cancelled),
        result = future => result,
    }
}

/// Drives the poll loop for one job.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JobWaiter {
    timeout: Duration,
    interval: Duration,
    output_grace: Duration,
}

impl JobWaiter {
    /// Creates a waiter with the given deadline and poll interval.
    #[must_use]
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            output_grace: DEFAULT_OUTPUT_GRACE,
        }
    }

    /// Overrides the bound on the diagnostic output fetch.
    #[must_use]
    pub const fn with_output_grace(mut self, grace: Duration) -> Self {
        self.output_grace = grace;
        self
    }

    /// Polls `job` until it reaches a terminal state.
    pub async fn wait<A>(
        &self,
        api: &A,
        job: &LaunchedJob,
        token: &CancellationToken,
    ) -> WaitOutcome
    where
        A: AutomationApi + ?Sized,
    {
        let started = Instant::now();
        loop {
            let snapshot = match cancellable(token, api.job_status(job)).await {
                Ok(snapshot) => snapshot,
                Err(RemoteError::Cancelled) => return WaitOutcome::Cancelled,
                Err(err) => return WaitOutcome::Failed(JobFailure::Poll(err)),
            };
            debug!(%job, status = %snapshot.status, failed = snapshot.failed, "polled job");

            match snapshot.state() {
                JobStatus::Successful => return WaitOutcome::Succeeded(snapshot),
                JobStatus::Failed => {
                    let detail = self.failure_detail(api, job, &snapshot, token).await;
                    return WaitOutcome::Failed(JobFailure::Reported { snapshot, detail });
                }
                JobStatus::Pending => {}
            }

            tokio::select! {
                biased;
                () = token.cancelled() => return WaitOutcome::Cancelled,
                () = sleep(self.interval) => {}
            }

            let elapsed = started.elapsed();
            if elapsed > self.timeout {
                return WaitOutcome::TimedOut { elapsed };
            }
        }
    }

    async fn failure_detail<A>(
        &self,
        api: &A,
        job: &LaunchedJob,
        snapshot: &JobSnapshot,
        token: &CancellationToken,
    ) -> Option<String>
    where
        A: AutomationApi + ?Sized,
    {
        if let Some(explanation) = &snapshot.explanation {
            return Some(explanation.clone());
        }
        let fetch = cancellable(token, api.job_output(job));
        match tokio::time::timeout(self.output_grace, fetch).await {
            Ok(Ok(output)) => output.map(|text| tail(&text, OUTPUT_TAIL_LINES)),
            Ok(Err(err)) => {
                warn!(%job, error = %err, "could not fetch job output");
                None
            }
            Err(_) => {
                warn!(%job, "job output fetch timed out");
                None
            }
        }
    }
}

fn tail(text: &str, lines: usize) -> String {
    let mut kept: Vec<&str> = text.trim_end().lines().rev().take(lines).collect();
    kept.reverse();
    kept.join("\n")
}
