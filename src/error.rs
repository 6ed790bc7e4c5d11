//! Error taxonomy for the training core.
//!
//! Errors are split by blast radius:
//! - [`EpisodeFault`] covers everything recoverable at episode granularity.
//!   These are caught at the orchestrator boundary, recorded on the episode,
//!   and never abort the run on their own.
//! - [`TrainError`] covers fatal conditions that terminate (or prevent) a run.
//!
//! A rejected action is deliberately *not* an error type: the environment
//! refusing a tool call is ordinary episode data, recorded on the step.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to construct a fresh environment for an episode.
///
/// Recoverable: the orchestrator skips the episode and moves on, unless the
/// consecutive-failure threshold is crossed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("environment initialization failed: {message}")]
pub struct EnvironmentInitError {
    pub message: String,
}

impl EnvironmentInitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure of the policy learner's update operation.
///
/// The orchestrator retries the update once; a second failure is fatal to
/// the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("policy update failed: {message}")]
pub struct UpdateError {
    pub message: String,
}

impl UpdateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A recoverable, per-episode failure recorded on the episode's log entry.
///
/// Every faulted episode still gets a record, so no episode index is ever
/// silently lost.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EpisodeFault {
    /// `create_environment` failed; the episode never started.
    #[error("environment initialization failed: {message}")]
    EnvironmentInit { message: String },

    /// The episode hit the hard step cap before the environment signalled
    /// terminal.
    #[error("episode exceeded the step limit of {limit}")]
    StepLimitExceeded { limit: usize },

    /// The episode hit the wall-clock budget before completing.
    #[error("episode exceeded the wall-clock budget of {budget_ms} ms")]
    TimedOut { budget_ms: u64 },

    /// The agent could not produce a decision.
    #[error("agent decision failed: {message}")]
    Decision { message: String },

    /// The environment failed mid-episode (after successful initialization).
    #[error("environment interaction failed: {message}")]
    Interaction { message: String },
}

/// A fatal condition: the run cannot start, or terminates in the `Failed`
/// state. Partial results accumulated before the failure are preserved.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("scenario '{name}' is already registered")]
    DuplicateScenario { name: String },

    #[error("scenario '{name}' declares no trainable components")]
    NoTrainableComponents { name: String },

    #[error("{count} consecutive environment failures exceeded the threshold of {threshold}")]
    ConsecutiveFailures { count: usize, threshold: usize },

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error("unknown run handle: {0}")]
    UnknownRun(String),

    #[error("run task aborted: {0}")]
    RunAborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_init_display() {
        let e = EnvironmentInitError::new("backend unreachable");
        assert_eq!(
            e.to_string(),
            "environment initialization failed: backend unreachable"
        );
    }

    #[test]
    fn step_limit_display() {
        let f = EpisodeFault::StepLimitExceeded { limit: 50 };
        assert_eq!(f.to_string(), "episode exceeded the step limit of 50");
    }

    #[test]
    fn episode_fault_round_trips() {
        let f = EpisodeFault::TimedOut { budget_ms: 120_000 };
        let json = serde_json::to_string(&f).unwrap();
        let back: EpisodeFault = serde_json::from_str(&json).unwrap();
        assert_eq!(f, back);
    }

    #[test]
    fn update_error_converts_to_train_error() {
        let e: TrainError = UpdateError::new("gradient sync lost").into();
        assert!(e.to_string().contains("gradient sync lost"));
    }
}
