//! Bounded status polling.
//!
//! The poller checks the job status, pauses, and checks again until the job
//! reports DONE or the attempt budget is spent:
//!
//! ```text
//! CHECKING --DONE--> DONE
//! CHECKING --not done, attempts left--> WAITING --interval--> CHECKING
//! CHECKING --not done, budget spent--> EXHAUSTED
//! ```
//!
//! DONE with an error result is a failed job, and EXHAUSTED is an error;
//! neither lets the caller go on to read results.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::api::{JobState, JobStatus};
use crate::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_MAX_ATTEMPTS, DEFAULT_POLL_MAX_INTERVAL_MS};
use crate::error::{ApiError, BigQueryError};
use crate::service::{JobHandle, QueryService};

/// How often and how long to poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Pause after the first unsuccessful check.
    pub interval: Duration,
    /// Total status checks allowed, including the first.
    pub max_attempts: u32,
    /// Multiplier applied to the pause after every check; 1.0 keeps it fixed.
    pub backoff_factor: f64,
    /// Ceiling for the backed-off pause.
    pub max_interval: Duration,
    /// Ask the service to cancel the job when the budget runs out.
    pub cancel_on_exhaustion: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            backoff_factor: 1.0,
            max_interval: Duration::from_millis(DEFAULT_POLL_MAX_INTERVAL_MS),
            cancel_on_exhaustion: true,
        }
    }
}

impl PollPolicy {
    /// Fixed-interval policy.
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            ..Self::default()
        }
    }

    /// Pause to take after the `check`-th (1-based) unsuccessful check.
    pub fn delay_after(&self, check: u32) -> Duration {
        if self.backoff_factor <= 1.0 {
            return self.interval;
        }
        let exponent = check.saturating_sub(1).min(64) as i32;
        let scaled_ns = (self.interval.as_nanos() as f64 * self.backoff_factor.powi(exponent)).round();
        let ceiling = self.max_interval.max(self.interval);
        if !scaled_ns.is_finite() || scaled_ns >= ceiling.as_nanos() as f64 {
            ceiling
        } else {
            Duration::from_nanos(scaled_ns as u64)
        }
    }
}

/// Waits for a submitted job to reach a terminal state.
pub struct JobPoller<'a> {
    service: &'a dyn QueryService,
    policy: PollPolicy,
}

impl<'a> JobPoller<'a> {
    /// `policy.max_attempts` is clamped to at least 1.
    pub fn new(service: &'a dyn QueryService, mut policy: PollPolicy) -> Self {
        policy.max_attempts = policy.max_attempts.max(1);
        Self { service, policy }
    }

    /// Poll until the job is DONE.
    ///
    /// Returns the final status on success. Fails with
    /// [`BigQueryError::StatusFetch`] as soon as a status call fails,
    /// [`BigQueryError::JobFailed`] when the job finished with an error, and
    /// [`BigQueryError::PollExhausted`] after `max_attempts` checks without
    /// DONE. No pause follows the last check.
    pub async fn wait_until_done(&self, job: &JobHandle) -> Result<JobStatus, BigQueryError> {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            let snapshot = self.service.get_job(job).await.map_err(|source| {
                error!(job_id = %job.job_id, attempt, error = %source, "Status check failed");
                BigQueryError::StatusFetch {
                    job_id: job.job_id.clone(),
                    source,
                }
            })?;

            let status = snapshot.status.ok_or_else(|| BigQueryError::StatusFetch {
                job_id: job.job_id.clone(),
                source: ApiError::MissingField("status"),
            })?;

            debug!(
                job_id = %job.job_id,
                state = %status.state,
                attempt,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Polling job status"
            );

            match &status.state {
                JobState::Done => {
                    if let Some(failure) = &status.error_result {
                        error!(
                            job_id = %job.job_id,
                            reason = %failure.reason,
                            message = %failure.message,
                            "Job failed"
                        );
                        return Err(BigQueryError::JobFailed {
                            job_id: job.job_id.clone(),
                            reason: failure.reason.clone(),
                            message: failure.message.clone(),
                        });
                    }

                    let stats = snapshot.statistics.unwrap_or_default();
                    info!(
                        job_id = %job.job_id,
                        attempts = attempt,
                        bytes_processed = stats.total_bytes_processed.unwrap_or(0),
                        engine_ms = stats.elapsed_ms().unwrap_or(0),
                        "Job done"
                    );
                    return Ok(status);
                }
                JobState::Pending | JobState::Running => {}
                JobState::Unknown(state) => {
                    warn!(job_id = %job.job_id, state = %state, "Unrecognised job state, still waiting");
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.delay_after(attempt)).await;
            }
        }

        warn!(
            job_id = %job.job_id,
            attempts = max_attempts,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Job not done within poll budget"
        );

        if self.policy.cancel_on_exhaustion {
            // Best-effort: the exhaustion error is what the caller sees either way.
            match self.service.cancel_job(job).await {
                Ok(()) => info!(job_id = %job.job_id, "Job cancellation requested"),
                Err(e) => warn!(job_id = %job.job_id, error = %e, "Job cancellation failed"),
            }
        }

        Err(BigQueryError::PollExhausted {
            job_id: job.job_id.clone(),
            attempts: max_attempts,
        })
    }
}
