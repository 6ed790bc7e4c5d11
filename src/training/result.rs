//! Run-level result types: per-episode records, aggregate metrics, and the
//! final training result.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EpisodeFault;
use crate::trajectory::types::{Outcome, RewardVector};

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// The run state machine: `Idle -> Running -> {Completed, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    /// Whether the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Per-episode record
// ---------------------------------------------------------------------------

/// What a run remembers about one episode. Every episode index the loop
/// reached has exactly one record, faulted episodes included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// Episode index within the run.
    pub index: usize,
    /// Terminal outcome; the undefined sentinel for episodes the evaluator
    /// could not score (excluded from aggregates, kept in the log).
    pub outcome: Outcome,
    /// The per-step reward vector submitted to the learner. Empty for
    /// episodes that never produced a step.
    pub rewards: RewardVector,
    /// Wall-clock duration of the episode.
    pub duration_ms: u64,
    /// Number of decision steps collected.
    pub steps: usize,
    /// The recoverable fault that degraded this episode, if any.
    pub fault: Option<EpisodeFault>,
}

// ---------------------------------------------------------------------------
// Aggregate metrics
// ---------------------------------------------------------------------------

/// Aggregates over a run's episode records.
///
/// Pure function of the raw records: recomputing from the same log always
/// yields identical aggregates. Episodes with undefined outcomes are
/// excluded from every aggregate but still counted in `episodes_excluded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    /// Mean outcome over scored episodes. `None` when no episode was scored.
    pub mean_outcome: Option<f64>,
    /// Fraction of scored episodes at or above the success threshold.
    pub success_rate: Option<f64>,
    /// Least-squares slope of outcome against episode position; positive
    /// means the run was improving. `None` below two scored episodes.
    pub trend: Option<f64>,
    /// Number of scored episodes contributing to the aggregates.
    pub episodes_counted: usize,
    /// Number of episodes excluded for undefined outcomes.
    pub episodes_excluded: usize,
}

impl AggregateMetrics {
    /// Compute aggregates from raw records and the scenario's success
    /// threshold.
    pub fn from_records(records: &[EpisodeRecord], success_threshold: f64) -> Self {
        let scored: Vec<(usize, f64)> = records
            .iter()
            .enumerate()
            .filter_map(|(pos, r)| r.outcome.score().map(|s| (pos, s)))
            .collect();

        let excluded = records.len() - scored.len();
        if scored.is_empty() {
            return Self {
                mean_outcome: None,
                success_rate: None,
                trend: None,
                episodes_counted: 0,
                episodes_excluded: excluded,
            };
        }

        let n = scored.len() as f64;
        let mean = scored.iter().map(|(_, s)| s).sum::<f64>() / n;
        let successes = scored
            .iter()
            .filter(|(_, s)| *s >= success_threshold)
            .count();

        let trend = if scored.len() >= 2 {
            let mean_x = scored.iter().map(|(x, _)| *x as f64).sum::<f64>() / n;
            let cov: f64 = scored
                .iter()
                .map(|(x, s)| (*x as f64 - mean_x) * (s - mean))
                .sum();
            let var_x: f64 = scored
                .iter()
                .map(|(x, _)| (*x as f64 - mean_x).powi(2))
                .sum();
            if var_x > 0.0 {
                Some(cov / var_x)
            } else {
                None
            }
        } else {
            None
        };

        Self {
            mean_outcome: Some(mean),
            success_rate: Some(successes as f64 / n),
            trend,
            episodes_counted: scored.len(),
            episodes_excluded: excluded,
        }
    }
}

// ---------------------------------------------------------------------------
// Training result
// ---------------------------------------------------------------------------

/// The finalized record of one training run.
///
/// Created once per run, immutable after the run reaches a terminal state,
/// owned by the caller. Serializes losslessly; the result store keys records
/// by `run_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Unique run identifier (UUID v4).
    pub run_id: String,
    /// Scenario name and version this run trained against.
    pub scenario: String,
    pub scenario_version: String,
    /// Terminal state of the run. Anything other than `Completed` means the
    /// episode log is partial.
    pub state: RunState,
    /// Episodes the run was asked to execute.
    pub planned_episodes: usize,
    /// One record per processed episode index, in order.
    pub episodes: Vec<EpisodeRecord>,
    /// Aggregates over the episode log.
    pub metrics: AggregateMetrics,
    /// Stable reference to the learner's exported parameter artifact.
    pub artifact: Option<PathBuf>,
    /// Rendering of the fatal condition when `state` is `Failed`.
    pub fault: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TrainingResult {
    /// Persist this result as pretty-printed JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("failed to write result to {}", path.as_ref().display()))
    }

    /// Load a previously saved result.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read result from {}", path.as_ref().display()))?;
        serde_json::from_str(&text).context("failed to parse training result")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::types::Outcome;

    fn record(index: usize, outcome: Outcome) -> EpisodeRecord {
        EpisodeRecord {
            index,
            outcome,
            rewards: RewardVector::empty(),
            duration_ms: 5,
            steps: 2,
            fault: None,
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
    }

    #[test]
    fn empty_log_yields_empty_aggregates() {
        let m = AggregateMetrics::from_records(&[], 1.0);
        assert_eq!(m.mean_outcome, None);
        assert_eq!(m.success_rate, None);
        assert_eq!(m.episodes_counted, 0);
    }

    #[test]
    fn success_counted_exactly_at_threshold() {
        let records = vec![
            record(0, Outcome::Score(1.0)),
            record(1, Outcome::Score(0.99)),
            record(2, Outcome::Score(1.5)),
        ];
        let m = AggregateMetrics::from_records(&records, 1.0);
        // 1.0 and 1.5 count; 0.99 does not.
        assert_eq!(m.success_rate, Some(2.0 / 3.0));
    }

    #[test]
    fn undefined_outcomes_excluded_from_aggregates() {
        let records = vec![
            record(0, Outcome::Score(1.0)),
            record(1, Outcome::Undefined),
            record(2, Outcome::Score(0.0)),
        ];
        let m = AggregateMetrics::from_records(&records, 1.0);
        assert_eq!(m.episodes_counted, 2);
        assert_eq!(m.episodes_excluded, 1);
        assert_eq!(m.mean_outcome, Some(0.5));
    }

    #[test]
    fn recomputation_is_idempotent() {
        let records = vec![
            record(0, Outcome::Score(0.2)),
            record(1, Outcome::Score(0.6)),
            record(2, Outcome::Undefined),
            record(3, Outcome::Score(1.0)),
        ];
        let a = AggregateMetrics::from_records(&records, 0.8);
        let b = AggregateMetrics::from_records(&records, 0.8);
        assert_eq!(a, b);
    }

    #[test]
    fn trend_is_positive_for_improving_runs() {
        let records = vec![
            record(0, Outcome::Score(0.0)),
            record(1, Outcome::Score(0.5)),
            record(2, Outcome::Score(1.0)),
        ];
        let m = AggregateMetrics::from_records(&records, 1.0);
        let trend = m.trend.unwrap();
        assert!((trend - 0.5).abs() < 1e-9);
    }

    #[test]
    fn result_round_trips_through_file() {
        let result = TrainingResult {
            run_id: uuid::Uuid::new_v4().to_string(),
            scenario: "support-sim".into(),
            scenario_version: "1".into(),
            state: RunState::Completed,
            planned_episodes: 2,
            episodes: vec![record(0, Outcome::Score(1.0)), record(1, Outcome::Undefined)],
            metrics: AggregateMetrics::from_records(
                &[record(0, Outcome::Score(1.0)), record(1, Outcome::Undefined)],
                1.0,
            ),
            artifact: Some(PathBuf::from("artifacts/weights.json")),
            fault: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        let path = std::env::temp_dir().join(format!(
            "filament-result-{}.json",
            uuid::Uuid::new_v4()
        ));
        result.save_to_file(&path).unwrap();
        let back = TrainingResult::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(result, back);
    }
}
