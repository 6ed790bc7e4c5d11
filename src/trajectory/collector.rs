//! Live episode collection.
//!
//! The [`TrajectoryCollector`] drives exactly one episode by repeatedly:
//!   1. observing the environment's state and acceptable tools,
//!   2. asking the learner for a decision (always from its *current*
//!      parameters -- trajectories are never replayed from storage),
//!   3. applying the decision to the environment,
//!   4. appending the resulting step.
//!
//! The loop ends when the environment signals terminal or the hard step cap
//! is reached; the cap guarantees termination, with the capped episode marked
//! truncated so the orchestrator records it as a failure instead of hanging.
//! A rejected action becomes a step with an explicit rejection marker, never
//! a silent retry. Both awaits select against the cancellation token, so a
//! cancelled episode drops its partial trajectory and releases the
//! environment immediately.

use crate::cancel::CancelToken;
use crate::env::Environment;
use crate::error::EpisodeFault;
use crate::learner::PolicyLearner;
use crate::scenario::traits::TrainableMap;
use crate::trajectory::types::{ComponentMark, Step, Trajectory};

/// Why a collection attempt did not produce a trajectory.
#[derive(Debug)]
pub enum CollectAbort {
    /// Cancellation was requested; the partial trajectory is discarded.
    Cancelled,
    /// A recoverable per-episode fault.
    Fault(EpisodeFault),
}

/// Drives one live episode between an environment and the current policy.
#[derive(Debug, Clone)]
pub struct TrajectoryCollector {
    scenario_name: String,
    max_steps: usize,
}

impl TrajectoryCollector {
    /// * `scenario_name` -- written into the trajectory for attribution.
    /// * `max_steps` -- hard cap on decision steps per episode.
    pub fn new(scenario_name: &str, max_steps: usize) -> Self {
        Self {
            scenario_name: scenario_name.to_string(),
            max_steps,
        }
    }

    /// Run one episode to completion, truncation, fault, or cancellation.
    ///
    /// The returned trajectory has at least one step and no outcome yet; the
    /// orchestrator evaluates and finalizes it.
    pub async fn collect(
        &self,
        env: &mut dyn Environment,
        learner: &dyn PolicyLearner,
        scope: &TrainableMap,
        cancel: &CancelToken,
    ) -> Result<Trajectory, CollectAbort> {
        let mut trajectory = Trajectory::new(&self.scenario_name);

        let mut observation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CollectAbort::Cancelled),
            obs = env.observe() => obs.map_err(|e| {
                CollectAbort::Fault(EpisodeFault::Interaction {
                    message: e.to_string(),
                })
            })?,
        };

        if observation.terminal {
            // A trajectory must contain at least one decision; an environment
            // that is terminal before the first observation never gave the
            // agent anything to decide.
            return Err(CollectAbort::Fault(EpisodeFault::Interaction {
                message: "environment was terminal before the first decision".to_string(),
            }));
        }

        for index in 0..self.max_steps {
            if observation.terminal {
                break;
            }

            let decision = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CollectAbort::Cancelled),
                d = learner.act(&observation, scope) => d.map_err(|e| {
                    CollectAbort::Fault(EpisodeFault::Decision {
                        message: e.to_string(),
                    })
                })?,
            };

            let marks: Vec<ComponentMark> = decision
                .components
                .iter()
                .map(|&component| ComponentMark {
                    component,
                    trainable: scope.is_trainable(component),
                })
                .collect();

            let effect = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CollectAbort::Cancelled),
                e = env.apply(&decision) => e.map_err(|e| {
                    CollectAbort::Fault(EpisodeFault::Interaction {
                        message: e.to_string(),
                    })
                })?,
            };

            if let Some(reason) = &effect.rejected {
                tracing::debug!(
                    step = index,
                    tool = %decision.tool,
                    reason = %reason,
                    "environment rejected action"
                );
            }

            trajectory.push(Step {
                index,
                snapshot: observation.snapshot.clone(),
                tool: decision.tool,
                parameters: decision.parameters,
                components: marks,
                rejected: effect.rejected,
                signal: effect.signal,
            });

            observation = effect.observation;
        }

        if !observation.terminal {
            trajectory.truncated = true;
            tracing::warn!(
                scenario = %self.scenario_name,
                steps = trajectory.len(),
                limit = self.max_steps,
                "episode hit step limit before terminal"
            );
        }

        tracing::debug!(
            scenario = %self.scenario_name,
            trajectory = %trajectory.id,
            steps = trajectory.len(),
            truncated = trajectory.truncated,
            "collected episode"
        );

        Ok(trajectory)
    }
}
