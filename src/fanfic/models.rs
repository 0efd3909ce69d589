//! Data models for the fanfic job pipeline.
//!
//! Defines jobs, update methods, effective modes, retry states and outcomes.

use serde::{Deserialize, Serialize};

/// Update method configured for the library (`calibre.update_method`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMethod {
    #[default]
    Update,
    UpdateAlways,
    Force,
    UpdateNoForce, // never force, even when requested
}

impl UpdateMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMethod::Update => "update",
            UpdateMethod::UpdateAlways => "update_always",
            UpdateMethod::Force => "force",
            UpdateMethod::UpdateNoForce => "update_no_force",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "update" => Some(UpdateMethod::Update),
            "update_always" => Some(UpdateMethod::UpdateAlways),
            "force" => Some(UpdateMethod::Force),
            "update_no_force" => Some(UpdateMethod::UpdateNoForce),
            _ => None,
        }
    }
}

/// Mode handed to the downloader for a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveMode {
    Update,
    UpdateAlways,
    Force,
}

impl EffectiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveMode::Update => "update",
            EffectiveMode::UpdateAlways => "update_always",
            EffectiveMode::Force => "force",
        }
    }

    /// FanFicFare command line flag selecting this mode.
    pub fn cli_flag(&self) -> &'static str {
        match self {
            EffectiveMode::Update => "-u",
            EffectiveMode::UpdateAlways => "-U",
            EffectiveMode::Force => "--force",
        }
    }
}

/// Outcome of the most recent attempt of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastOutcome {
    Pending,
    Success,
    NeedsForceRetry,
    FailedTransient,
    FailedTerminal,
}

impl LastOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LastOutcome::Pending => "pending",
            LastOutcome::Success => "success",
            LastOutcome::NeedsForceRetry => "needs_force_retry",
            LastOutcome::FailedTransient => "failed_transient",
            LastOutcome::FailedTerminal => "failed_terminal",
        }
    }
}

/// Position of a job in the retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Normal attempt; the payload is the number of attempts already made (0..=10).
    Pending(u32),
    /// The single long-delay attempt after normal retries ran out.
    HailMary,
    Succeeded, // terminal
    Exhausted, // terminal
}

impl RetryState {
    /// Returns true if this is a terminal state (Succeeded or Exhausted).
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Succeeded | RetryState::Exhausted)
    }
}

/// One URL's pending or in-flight processing.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique identifier (UUID), for log correlation
    pub id: String,
    /// Normalised story URL
    pub url: String,
    /// Routing bucket selected by the site router
    pub site_key: String,
    /// Number of attempts already made
    pub attempt_count: u32,
    /// Force requested at submission or by an automatic force signal
    pub requested_force: bool,
    /// Set once a force request was downgraded because of `update_no_force`
    pub force_ignored: bool,
    /// Effective mode of every attempt so far, oldest first
    pub mode_history: Vec<EffectiveMode>,
    /// Outcome of the latest attempt
    pub last_outcome: LastOutcome,
    /// Current state in the retry state machine
    pub retry_state: RetryState,
}

impl Job {
    /// Create a fresh job that has not been attempted yet.
    pub fn new(url: impl Into<String>, site_key: impl Into<String>, requested_force: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            site_key: site_key.into(),
            attempt_count: 0,
            requested_force,
            force_ignored: false,
            mode_history: Vec::new(),
            last_outcome: LastOutcome::Pending,
            retry_state: RetryState::Pending(0),
        }
    }

    /// Mode of the latest attempt, if any.
    #[cfg(test)]
    fn last_mode(&self) -> Option<EffectiveMode> {
        self.mode_history.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_method_round_trip_names() {
        for method in [
            UpdateMethod::Update,
            UpdateMethod::UpdateAlways,
            UpdateMethod::Force,
            UpdateMethod::UpdateNoForce,
        ] {
            assert_eq!(UpdateMethod::from_str(method.as_str()), Some(method));
        }
        assert_eq!(UpdateMethod::from_str("sometimes"), None);
    }

    #[test]
    fn test_update_method_deserializes_snake_case() {
        let method: UpdateMethod = serde_json::from_str("\"update_no_force\"").unwrap();
        assert_eq!(method, UpdateMethod::UpdateNoForce);
    }

    #[test]
    fn test_cli_flags() {
        assert_eq!(EffectiveMode::Update.cli_flag(), "-u");
        assert_eq!(EffectiveMode::UpdateAlways.cli_flag(), "-U");
        assert_eq!(EffectiveMode::Force.cli_flag(), "--force");
    }

    #[test]
    fn test_new_job_starts_pending() {
        let job = Job::new("archiveofourown.org/works/1", "ao3", false);
        assert_eq!(job.attempt_count, 0);
        assert_eq!(job.retry_state, RetryState::Pending(0));
        assert_eq!(job.last_outcome, LastOutcome::Pending);
        assert!(!job.force_ignored);
        assert!(job.last_mode().is_none());
        assert!(!job.retry_state.is_terminal());
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = Job::new("u", "other", false);
        let b = Job::new("u", "other", false);
        assert_ne!(a.id, b.id);
    }
}
