//! The scenario (task definition) contract.
//!
//! A scenario declares everything a training run needs to know about a task:
//! how to build a fresh per-episode environment, how to score a completed
//! trajectory, and which decision components are trainable. Scenarios are
//! constructed once at registry load time and are immutable afterwards; the
//! orchestrator only ever borrows them read-only and never branches on task
//! identity.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::env::Environment;
use crate::error::{EnvironmentInitError, TrainError};
use crate::trajectory::types::{DecisionComponent, Outcome, Trajectory};

// ---------------------------------------------------------------------------
// Trainable-component map
// ---------------------------------------------------------------------------

/// Which decision components receive updates and which stay frozen.
///
/// Components absent from the map are frozen. A map with no trainable
/// component describes a training run that could never learn anything, so it
/// is rejected at validation time, before any episode executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainableMap {
    components: BTreeMap<DecisionComponent, bool>,
}

impl TrainableMap {
    /// Build a map from explicit (component, trainable) pairs.
    pub fn from_pairs(pairs: &[(DecisionComponent, bool)]) -> Self {
        Self {
            components: pairs.iter().copied().collect(),
        }
    }

    /// Every component trainable.
    pub fn all_trainable() -> Self {
        Self {
            components: DecisionComponent::all().into_iter().map(|c| (c, true)).collect(),
        }
    }

    /// Every component frozen. Only useful for constructing invalid maps in
    /// validation tests.
    pub fn all_frozen() -> Self {
        Self {
            components: DecisionComponent::all().into_iter().map(|c| (c, false)).collect(),
        }
    }

    pub fn is_trainable(&self, component: DecisionComponent) -> bool {
        self.components.get(&component).copied().unwrap_or(false)
    }

    /// The trainable components, in stable order.
    pub fn trainable(&self) -> impl Iterator<Item = DecisionComponent> + '_ {
        self.components
            .iter()
            .filter(|(_, &t)| t)
            .map(|(&c, _)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DecisionComponent, bool)> + '_ {
        self.components.iter().map(|(&c, &t)| (c, t))
    }

    /// Reject maps in which nothing is trainable.
    pub fn validate(&self, scenario_name: &str) -> Result<(), TrainError> {
        if self.trainable().next().is_none() {
            return Err(TrainError::NoTrainableComponents {
                name: scenario_name.to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scenario trait
// ---------------------------------------------------------------------------

/// A task definition: environment factory, outcome evaluator, and
/// trainable-component declaration.
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Unique scenario name, used as the registry key.
    fn name(&self) -> &str;

    /// Scenario version. Bumped when episode semantics change.
    fn version(&self) -> &str {
        "1"
    }

    /// Build a fresh environment for one episode.
    ///
    /// Safe to call repeatedly; every returned environment has fully
    /// independent state. Failure aborts the current episode, not the run.
    async fn create_environment(&self) -> Result<Box<dyn Environment>, EnvironmentInitError>;

    /// Score a completed trajectory.
    ///
    /// Pure and infallible: deterministic trajectories evaluate to
    /// deterministic outcomes, and when no outcome can be computed the
    /// undefined sentinel is returned rather than an error.
    fn evaluate_outcome(&self, trajectory: &Trajectory) -> Outcome;

    /// Which decision components are trainable for this task.
    fn trainable_components(&self) -> &TrainableMap;

    /// Outcomes at or above this value count as successes in aggregate
    /// metrics.
    fn success_threshold(&self) -> f64 {
        1.0
    }

    /// The outcome recorded for episodes that hit the step cap or the
    /// wall-clock budget.
    fn failure_outcome(&self) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_components_are_frozen() {
        let map = TrainableMap::from_pairs(&[(DecisionComponent::ToolSelection, true)]);
        assert!(map.is_trainable(DecisionComponent::ToolSelection));
        assert!(!map.is_trainable(DecisionComponent::OutputGeneration));
    }

    #[test]
    fn all_frozen_fails_validation() {
        let map = TrainableMap::all_frozen();
        let err = map.validate("support-sim").unwrap_err();
        assert!(matches!(
            err,
            TrainError::NoTrainableComponents { name } if name == "support-sim"
        ));
    }

    #[test]
    fn mixed_map_passes_validation() {
        let map = TrainableMap::from_pairs(&[
            (DecisionComponent::ToolSelection, true),
            (DecisionComponent::ToolExecution, false),
        ]);
        assert!(map.validate("support-sim").is_ok());
        let trainable: Vec<_> = map.trainable().collect();
        assert_eq!(trainable, vec![DecisionComponent::ToolSelection]);
    }

    #[test]
    fn trainable_map_round_trips_through_json() {
        let map = TrainableMap::from_pairs(&[
            (DecisionComponent::ToolSelection, true),
            (DecisionComponent::ParameterSelection, false),
        ]);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("tool_selection"));
        let back: TrainableMap = serde_json::from_str(&json).unwrap();
        assert_eq!(map, back);
    }
}
