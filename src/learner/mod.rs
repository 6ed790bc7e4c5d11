//! The pluggable policy-learner boundary.
//!
//! The learner is a black box with two operations: `act` drives the agent's
//! decisions during collection (on-policy: always from the current
//! parameters), and `update` consumes a finalized trajectory with its reward
//! vector. The orchestrator never inspects a learner's internals and never
//! mutates agent state itself; the learner is the sole mutator of trained
//! parameters.
//!
//! Two in-process learners ship with the crate:
//! - [`FrozenLearner`] -- deterministic, never updates; baseline and
//!   determinism checks.
//! - [`PreferenceLearner`] -- per-component tool-preference weights updated
//!   by broadcast reward, honoring the trainable scope.

pub mod frozen;
pub mod preference;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::env::{Decision, EnvObservation};
use crate::error::UpdateError;
use crate::scenario::traits::TrainableMap;
use crate::trajectory::types::{RewardVector, Trajectory};

pub use frozen::FrozenLearner;
pub use preference::{PreferenceLearner, PreferenceWeights};

/// The two-operation contract every policy learner implements.
#[async_trait]
pub trait PolicyLearner: Send + Sync {
    /// Choose the next decision for the observed state, restricted to the
    /// given trainable scope. Frozen components still execute here; they are
    /// simply never updated.
    async fn act(
        &self,
        observation: &EnvObservation,
        scope: &TrainableMap,
    ) -> anyhow::Result<Decision>;

    /// Apply one learning update from a finalized trajectory and its reward
    /// vector, restricted to the trainable scope.
    ///
    /// Learners must treat a skip vector (undefined sentinel) as "do not
    /// update from this trajectory" and must reject a reward vector whose
    /// length does not match the trajectory.
    async fn update(
        &mut self,
        trajectory: &Trajectory,
        rewards: &RewardVector,
        scope: &TrainableMap,
    ) -> Result<(), UpdateError>;

    /// Persist the current trainable parameters to a durable artifact and
    /// return its location, or `None` for learners without durable
    /// parameters. Called once when a run reaches a terminal state; the
    /// returned reference must stay loadable after the run ends.
    fn export_parameters(&self) -> anyhow::Result<Option<PathBuf>>;
}
