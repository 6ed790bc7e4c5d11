//! A minimal two-decision scenario.
//!
//! Step 1 offers a single tool that always succeeds; step 2 offers a choice
//! between `resolve` (outcome 1.0) and `defer` (outcome 0.0). Small enough to
//! reason about broadcast behavior by hand, which makes it the standard
//! fixture for end-to-end checks and a handy smoke-test target from the CLI.

use async_trait::async_trait;

use crate::env::{ActionOutcome, Decision, EnvObservation, Environment};
use crate::error::EnvironmentInitError;
use crate::trajectory::types::{DecisionComponent, Outcome, Trajectory};

use super::traits::{Scenario, TrainableMap};

const ACKNOWLEDGE: &str = "acknowledge";
const RESOLVE: &str = "resolve";
const DEFER: &str = "defer";

/// The two-step task definition.
pub struct TwoStepScenario {
    map: TrainableMap,
}

impl TwoStepScenario {
    pub fn new() -> Self {
        Self {
            map: TrainableMap::from_pairs(&[
                (DecisionComponent::ToolSelection, true),
                (DecisionComponent::ParameterSelection, false),
            ]),
        }
    }
}

impl Default for TwoStepScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scenario for TwoStepScenario {
    fn name(&self) -> &str {
        "toy-2-step"
    }

    async fn create_environment(&self) -> Result<Box<dyn Environment>, EnvironmentInitError> {
        Ok(Box::new(TwoStepEnv { stage: 0 }))
    }

    fn evaluate_outcome(&self, trajectory: &Trajectory) -> Outcome {
        // The second accepted decision determines the outcome.
        let closing = trajectory
            .steps
            .iter()
            .filter(|s| s.rejected.is_none())
            .nth(1);
        match closing.map(|s| s.tool.as_str()) {
            Some(RESOLVE) => Outcome::Score(1.0),
            Some(DEFER) => Outcome::Score(0.0),
            _ => Outcome::Undefined,
        }
    }

    fn trainable_components(&self) -> &TrainableMap {
        &self.map
    }
}

/// Two decision points, then terminal.
struct TwoStepEnv {
    stage: u8,
}

impl TwoStepEnv {
    fn observation(&self) -> EnvObservation {
        match self.stage {
            0 => EnvObservation::new("new ticket awaiting acknowledgement", vec![
                ACKNOWLEDGE.to_string(),
            ]),
            1 => EnvObservation::new("ticket acknowledged, awaiting decision", vec![
                RESOLVE.to_string(),
                DEFER.to_string(),
            ]),
            _ => EnvObservation::terminal("ticket closed"),
        }
    }

    fn accepts(&self, tool: &str) -> bool {
        self.observation()
            .available_tools
            .iter()
            .any(|t| t == tool)
    }
}

#[async_trait]
impl Environment for TwoStepEnv {
    async fn observe(&mut self) -> anyhow::Result<EnvObservation> {
        Ok(self.observation())
    }

    async fn apply(&mut self, decision: &Decision) -> anyhow::Result<ActionOutcome> {
        if !self.accepts(&decision.tool) {
            return Ok(ActionOutcome::rejected(
                self.observation(),
                format!("tool '{}' not accepted at this stage", decision.tool),
            ));
        }
        self.stage += 1;
        Ok(ActionOutcome::accepted(self.observation(), 0.0))
    }
}
