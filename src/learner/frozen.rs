//! A learner that never learns.
//!
//! Deterministically picks the first available tool and ignores every update.
//! Useful as a lower-bound baseline and for determinism checks: with a fixed
//! environment seed, repeated runs driven by a frozen learner must produce
//! identical trajectories and reward vectors.

use std::path::PathBuf;

use anyhow::bail;
use async_trait::async_trait;

use crate::env::{Decision, EnvObservation};
use crate::error::UpdateError;
use crate::scenario::traits::TrainableMap;
use crate::trajectory::types::{DecisionComponent, RewardVector, Trajectory};

use super::PolicyLearner;

/// Deterministic first-available-tool policy with a no-op update.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrozenLearner;

impl FrozenLearner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyLearner for FrozenLearner {
    async fn act(
        &self,
        observation: &EnvObservation,
        _scope: &TrainableMap,
    ) -> anyhow::Result<Decision> {
        let Some(tool) = observation.available_tools.first() else {
            bail!("environment offered no tools to choose from");
        };
        Ok(
            Decision::new(tool.clone(), serde_json::json!({})).with_components(vec![
                DecisionComponent::ToolSelection,
                DecisionComponent::ParameterSelection,
            ]),
        )
    }

    async fn update(
        &mut self,
        trajectory: &Trajectory,
        rewards: &RewardVector,
        _scope: &TrainableMap,
    ) -> Result<(), UpdateError> {
        if !rewards.aligns_with(trajectory) {
            return Err(UpdateError::new(format!(
                "reward vector length {} does not match trajectory length {}",
                rewards.len(),
                trajectory.len()
            )));
        }
        Ok(())
    }

    fn export_parameters(&self) -> anyhow::Result<Option<PathBuf>> {
        Ok(None)
    }
}
