//! A tabular tool-preference learner.
//!
//! Maintains one scalar preference weight per tool identifier. During
//! collection it picks the highest-weighted available tool (epsilon-greedy,
//! seeded); during update it shifts each chosen tool's weight by
//! `learning_rate x reward` -- but only for steps whose tool-selection
//! component was marked trainable at collection time, so a frozen
//! tool-selection scope leaves the weights untouched no matter what rewards
//! arrive.
//!
//! This is deliberately small: enough policy to make training runs move and
//! to exercise the full update contract, while real optimization engines plug
//! in behind the same trait.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::LearnerConfig;
use crate::env::{Decision, EnvObservation};
use crate::error::UpdateError;
use crate::scenario::traits::TrainableMap;
use crate::trajectory::types::{DecisionComponent, RewardVector, Trajectory};

use super::PolicyLearner;

/// The learner's durable parameters: tool identifier -> preference weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceWeights {
    pub weights: BTreeMap<String, f64>,
    /// Number of trajectories that contributed updates.
    pub updates_applied: usize,
}

impl PreferenceWeights {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read weights from {}", path.as_ref().display()))?;
        serde_json::from_str(&text).context("failed to parse preference weights")
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("failed to write weights to {}", path.as_ref().display()))
    }
}

/// Epsilon-greedy tool-preference policy with reward-weighted updates.
pub struct PreferenceLearner {
    weights: PreferenceWeights,
    learning_rate: f64,
    exploration: f64,
    rng: Mutex<StdRng>,
    artifact_path: Option<PathBuf>,
}

impl PreferenceLearner {
    pub fn new(config: &LearnerConfig) -> Self {
        Self {
            weights: PreferenceWeights::default(),
            learning_rate: config.learning_rate,
            exploration: config.exploration,
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            artifact_path: config.artifact_path.clone(),
        }
    }

    /// Resume from a previously exported artifact.
    pub fn load(config: &LearnerConfig, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let weights = PreferenceWeights::load_from_file(path)?;
        let mut learner = Self::new(config);
        learner.weights = weights;
        Ok(learner)
    }

    /// Read-only view of the current parameters.
    pub fn weights(&self) -> &PreferenceWeights {
        &self.weights
    }

    fn weight_of(&self, tool: &str) -> f64 {
        self.weights.weights.get(tool).copied().unwrap_or(0.0)
    }

    /// Highest-weighted tool; ties broken by name order so the greedy choice
    /// is stable.
    fn greedy_choice<'a>(&self, tools: &'a [String]) -> Option<&'a String> {
        tools.iter().max_by(|a, b| {
            self.weight_of(a)
                .partial_cmp(&self.weight_of(b))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.as_str().cmp(a.as_str()))
        })
    }
}

#[async_trait]
impl PolicyLearner for PreferenceLearner {
    async fn act(
        &self,
        observation: &EnvObservation,
        _scope: &TrainableMap,
    ) -> anyhow::Result<Decision> {
        let tools = &observation.available_tools;
        if tools.is_empty() {
            anyhow::bail!("environment offered no tools to choose from");
        }

        let tool = {
            let mut rng = self.rng.lock().expect("rng lock poisoned");
            if rng.gen::<f64>() < self.exploration {
                tools[rng.gen_range(0..tools.len())].clone()
            } else {
                self.greedy_choice(tools)
                    .expect("non-empty tool list")
                    .clone()
            }
        };

        Ok(
            Decision::new(tool, serde_json::json!({})).with_components(vec![
                DecisionComponent::ToolSelection,
                DecisionComponent::ParameterSelection,
            ]),
        )
    }

    async fn update(
        &mut self,
        trajectory: &Trajectory,
        rewards: &RewardVector,
        scope: &TrainableMap,
    ) -> Result<(), UpdateError> {
        if !rewards.aligns_with(trajectory) {
            return Err(UpdateError::new(format!(
                "reward vector length {} does not match trajectory length {}",
                rewards.len(),
                trajectory.len()
            )));
        }

        // Undefined outcome: this trajectory carries no learning signal.
        if rewards.is_skip() {
            tracing::debug!(trajectory = %trajectory.id, "skipping update for undefined rewards");
            return Ok(());
        }

        if !scope.is_trainable(DecisionComponent::ToolSelection) {
            return Ok(());
        }

        let mut touched = false;
        for (step, reward) in trajectory.steps.iter().zip(rewards.iter()) {
            let Some(value) = reward.score() else { continue };
            let selection_trainable = step
                .components
                .iter()
                .any(|m| m.component == DecisionComponent::ToolSelection && m.trainable);
            if !selection_trainable {
                continue;
            }
            *self.weights.weights.entry(step.tool.clone()).or_insert(0.0) +=
                self.learning_rate * value;
            touched = true;
        }

        if touched {
            self.weights.updates_applied += 1;
        }
        Ok(())
    }

    fn export_parameters(&self) -> anyhow::Result<Option<PathBuf>> {
        let Some(path) = &self.artifact_path else {
            return Ok(None);
        };
        self.weights.save_to_file(path)?;
        tracing::info!(path = %path.display(), "exported learner parameters");
        Ok(Some(path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::types::{ComponentMark, Outcome, Step};

    fn greedy_config() -> LearnerConfig {
        LearnerConfig {
            learning_rate: 0.5,
            exploration: 0.0,
            seed: 7,
            artifact_path: None,
        }
    }

    fn step(index: usize, tool: &str, selection_trainable: bool) -> Step {
        Step {
            index,
            snapshot: format!("state-{index}"),
            tool: tool.to_string(),
            parameters: serde_json::json!({}),
            components: vec![ComponentMark {
                component: DecisionComponent::ToolSelection,
                trainable: selection_trainable,
            }],
            rejected: None,
            signal: 0.0,
        }
    }

    fn finalized(tools: &[(&str, bool)], outcome: Outcome) -> Trajectory {
        let mut t = Trajectory::new("demo");
        for (i, (tool, trainable)) in tools.iter().enumerate() {
            t.push(step(i, tool, *trainable));
        }
        t.finalize(outcome);
        t
    }

    fn broadcast(t: &Trajectory) -> RewardVector {
        crate::reward::RewardBroadcaster::uniform().broadcast(t)
    }

    #[tokio::test]
    async fn greedy_act_prefers_weighted_tool() {
        let mut learner = PreferenceLearner::new(&greedy_config());
        learner.weights.weights.insert("resolve".into(), 1.0);

        let obs = EnvObservation::new("state", vec!["defer".into(), "resolve".into()]);
        let d = learner.act(&obs, &TrainableMap::all_trainable()).await.unwrap();
        assert_eq!(d.tool, "resolve");
    }

    #[tokio::test]
    async fn update_shifts_weights_by_reward() {
        let mut learner = PreferenceLearner::new(&greedy_config());
        let t = finalized(&[("resolve", true), ("reply", true)], Outcome::Score(1.0));

        learner
            .update(&t, &broadcast(&t), &TrainableMap::all_trainable())
            .await
            .unwrap();

        assert_eq!(learner.weights().weights["resolve"], 0.5);
        assert_eq!(learner.weights().weights["reply"], 0.5);
        assert_eq!(learner.weights().updates_applied, 1);
    }

    #[tokio::test]
    async fn frozen_steps_are_never_updated() {
        let mut learner = PreferenceLearner::new(&greedy_config());
        let t = finalized(&[("resolve", false)], Outcome::Score(1.0));

        learner
            .update(&t, &broadcast(&t), &TrainableMap::all_trainable())
            .await
            .unwrap();

        assert!(learner.weights().weights.is_empty());
        assert_eq!(learner.weights().updates_applied, 0);
    }

    #[tokio::test]
    async fn frozen_scope_leaves_weights_untouched() {
        let mut learner = PreferenceLearner::new(&greedy_config());
        let t = finalized(&[("resolve", true)], Outcome::Score(1.0));
        let scope = TrainableMap::from_pairs(&[
            (DecisionComponent::ToolSelection, false),
            (DecisionComponent::OutputGeneration, true),
        ]);

        learner.update(&t, &broadcast(&t), &scope).await.unwrap();
        assert!(learner.weights().weights.is_empty());
    }

    #[tokio::test]
    async fn skip_vector_applies_no_update() {
        let mut learner = PreferenceLearner::new(&greedy_config());
        let t = finalized(&[("resolve", true)], Outcome::Undefined);

        learner
            .update(&t, &broadcast(&t), &TrainableMap::all_trainable())
            .await
            .unwrap();
        assert!(learner.weights().weights.is_empty());
    }

    #[test]
    fn weights_round_trip_through_file() {
        let mut weights = PreferenceWeights::default();
        weights.weights.insert("resolve".into(), 1.5);
        weights.updates_applied = 3;

        let path = std::env::temp_dir().join(format!(
            "filament-weights-{}.json",
            uuid::Uuid::new_v4()
        ));
        weights.save_to_file(&path).unwrap();
        let back = PreferenceWeights::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(weights, back);
    }
}
