//! Retry policy for failed updates.
//!
//! Linear backoff (one retry unit per failed attempt) followed by a single
//! long-delay Hail-Mary attempt. A failure of the Hail-Mary attempt is terminal.

use std::time::Duration;

use crate::config::RetrySettings;

use super::downloader::OutcomeStatus;
use super::models::{Job, LastOutcome, RetryState};

/// What the worker has to do with a job after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Terminal success. Catalog update and notification follow.
    Succeeded,
    /// Re-enqueue the job after `delay`.
    ///
    /// `penultimate` is set on the transition into the Hail-Mary attempt.
    Retry { delay: Duration, penultimate: bool },
    /// Terminal failure; no further attempts.
    Exhausted { force_ignored: bool },
}

/// Retry policy implementing the linear backoff and the Hail-Mary attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Number of normal retries before the Hail-Mary attempt.
    pub max_normal_retries: u32,
    /// Delay unit; the n-th retry waits `n * retry_unit`.
    pub retry_unit: Duration,
    /// Delay before the Hail-Mary attempt.
    pub hail_mary_delay: Duration,
}

impl RetryPolicy {
    /// Create a new RetryPolicy from configuration settings.
    pub fn new(config: &RetrySettings) -> Self {
        Self {
            max_normal_retries: config.max_normal_retries,
            retry_unit: Duration::from_secs(config.retry_unit_secs),
            hail_mary_delay: Duration::from_secs(config.hail_mary_hours.saturating_mul(60 * 60)),
        }
    }

    /// Delay to wait before the attempt that follows `attempt_count` failed attempts.
    ///
    /// `n * retry_unit` for n in `1..=max_normal_retries`, `hail_mary_delay` for
    /// `max_normal_retries + 1`, and `None` past that (no further attempt exists).
    #[cfg(test)]
    fn delay_for(&self, attempt_count: u32) -> Option<Duration> {
        match attempt_count {
            0 => None,
            n if n <= self.max_normal_retries => Some(self.retry_unit.saturating_mul(n)),
            n if Some(n) == self.max_normal_retries.checked_add(1) => Some(self.hail_mary_delay),
            _ => None,
        }
    }

    /// Feed the outcome of the latest attempt into the state machine.
    ///
    /// Increments `attempt_count`, records `last_outcome`, moves `retry_state`
    /// and, for a force signal, sets `requested_force` for the next attempt.
    pub fn on_outcome(&self, job: &mut Job, status: OutcomeStatus) -> RetryDecision {
        match job.retry_state {
            RetryState::Succeeded => return RetryDecision::Succeeded,
            RetryState::Exhausted => {
                return RetryDecision::Exhausted {
                    force_ignored: job.force_ignored,
                }
            }
            _ => {}
        }

        job.attempt_count += 1;

        if status == OutcomeStatus::Success {
            job.last_outcome = LastOutcome::Success;
            job.retry_state = RetryState::Succeeded;
            return RetryDecision::Succeeded;
        }

        if status == OutcomeStatus::NeedsForceRetry {
            job.requested_force = true;
        }

        match job.retry_state {
            RetryState::Pending(n) if n < self.max_normal_retries => {
                job.last_outcome = failed_outcome(status);
                job.retry_state = RetryState::Pending(n + 1);
                RetryDecision::Retry {
                    delay: self.retry_unit.saturating_mul(n + 1),
                    penultimate: false,
                }
            }
            RetryState::Pending(_) => {
                job.last_outcome = failed_outcome(status);
                job.retry_state = RetryState::HailMary;
                RetryDecision::Retry {
                    delay: self.hail_mary_delay,
                    penultimate: true,
                }
            }
            _ => {
                job.last_outcome = LastOutcome::FailedTerminal;
                job.retry_state = RetryState::Exhausted;
                RetryDecision::Exhausted {
                    force_ignored: job.force_ignored,
                }
            }
        }
    }
}

fn failed_outcome(status: OutcomeStatus) -> LastOutcome {
    match status {
        OutcomeStatus::NeedsForceRetry => LastOutcome::NeedsForceRetry,
        _ => LastOutcome::FailedTransient,
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_normal_retries: 10,
            retry_unit: Duration::from_secs(60),
            hail_mary_delay: Duration::from_secs(12 * 60 * 60),
        }
    }
}
