use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete configuration for the training core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilamentConfig {
    pub orchestrator: OrchestratorConfig,
    pub learner: LearnerConfig,
    pub store: StoreConfig,
}

/// Episode-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Hard cap on decision steps per episode (default: 50). Episodes hitting
    /// the cap are recorded with a failure outcome rather than left running.
    pub max_steps_per_episode: usize,
    /// Wall-clock budget per episode in milliseconds (default: 120000).
    /// `None` disables the wall-clock timeout; the step cap still applies.
    pub episode_timeout_ms: Option<u64>,
    /// Consecutive environment-initialization failures tolerated before the
    /// run is declared failed (default: 3).
    pub consecutive_failure_threshold: usize,
    /// Retries for a failed learner update before the run is declared failed
    /// (default: 1).
    pub update_retries: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps_per_episode: 50,
            episode_timeout_ms: Some(120_000),
            consecutive_failure_threshold: 3,
            update_retries: 1,
        }
    }
}

/// Configuration for the built-in preference learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Weight shift per unit of reward (default: 0.1).
    pub learning_rate: f64,
    /// Probability of exploring a random tool instead of the greedy choice
    /// (default: 0.05).
    pub exploration: f64,
    /// RNG seed for exploration (default: 7).
    pub seed: u64,
    /// Where to export the parameter artifact at run end. `None` disables the
    /// artifact (default: None).
    pub artifact_path: Option<PathBuf>,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            exploration: 0.05,
            seed: 7,
            artifact_path: None,
        }
    }
}

/// Result persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory for per-run result records (default: `results`).
    pub results_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
        }
    }
}
