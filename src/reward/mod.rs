//! Credit assignment by trajectory-level outcome broadcasting.
//!
//! Tool-use decisions have no per-step ground truth to learn from: nobody
//! labels whether an individual lookup or parameter choice was "right". The
//! broadcaster therefore replicates the single terminal outcome to every step
//! of the trajectory, `reward[i] = outcome` for all `i`, which is the
//! simplest credit assignment consistent with an outcome-only signal, and the
//! on-policy alternative to falling back to offline supervised fine-tuning.
//!
//! Non-uniform credit assignment stays possible without touching the
//! orchestrator's call contract: an optional weighting hook scales the
//! broadcast value per step.

use std::sync::Arc;

use crate::trajectory::types::{Outcome, RewardVector, Trajectory};

/// Per-step weighting hook: `w(step_index, trajectory)` multiplies the
/// broadcast outcome for that step.
pub type StepWeight = Arc<dyn Fn(usize, &Trajectory) -> f64 + Send + Sync>;

/// Converts a trajectory's terminal outcome into its per-step reward vector.
#[derive(Clone, Default)]
pub struct RewardBroadcaster {
    weight: Option<StepWeight>,
}

impl RewardBroadcaster {
    /// Uniform broadcasting: every step receives the outcome unmodified.
    pub fn uniform() -> Self {
        Self { weight: None }
    }

    /// Broadcasting with a per-step weighting function.
    pub fn with_weighting(weight: StepWeight) -> Self {
        Self {
            weight: Some(weight),
        }
    }

    /// Produce the reward vector for a finalized trajectory.
    ///
    /// The result always has exactly one entry per step. An undefined (or
    /// missing) outcome yields the undefined sentinel at every position,
    /// which tells the learner to skip this trajectory; the weighting hook is
    /// not consulted in that case.
    pub fn broadcast(&self, trajectory: &Trajectory) -> RewardVector {
        let n = trajectory.len();
        let values = match trajectory.outcome {
            Some(Outcome::Score(outcome)) => (0..n)
                .map(|i| {
                    let w = self.weight.as_ref().map_or(1.0, |f| f(i, trajectory));
                    Outcome::Score(outcome * w)
                })
                .collect(),
            Some(Outcome::Undefined) | None => vec![Outcome::Undefined; n],
        };
        RewardVector::new(values)
    }
}

impl std::fmt::Debug for RewardBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardBroadcaster")
            .field("weighted", &self.weight.is_some())
            .finish()
    }
}
