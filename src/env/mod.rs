//! The per-episode environment boundary.
//!
//! An [`Environment`] is the mutable interaction surface for exactly one
//! episode: created fresh by a scenario's factory, owned exclusively by the
//! trajectory collector while the episode runs, and discarded when it ends.
//! Environments never survive across episodes, which is what guarantees the
//! no-cross-episode-leakage part of the scenario contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::trajectory::types::DecisionComponent;

// ---------------------------------------------------------------------------
// Observation and decision types
// ---------------------------------------------------------------------------

/// What the agent sees at a decision point: the state snapshot, the tools the
/// environment is willing to accept, and whether the episode has ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvObservation {
    /// Textual snapshot of the current state.
    pub snapshot: String,
    /// Tool identifiers the environment currently accepts.
    pub available_tools: Vec<String>,
    /// Whether the episode has reached a terminal condition.
    pub terminal: bool,
    /// Arbitrary extra information (task-specific).
    #[serde(default)]
    pub info: serde_json::Value,
}

impl EnvObservation {
    /// A non-terminal observation with no extra info.
    pub fn new(snapshot: impl Into<String>, available_tools: Vec<String>) -> Self {
        Self {
            snapshot: snapshot.into(),
            available_tools,
            terminal: false,
            info: serde_json::Value::Null,
        }
    }

    /// A terminal observation. No further decisions will be requested.
    pub fn terminal(snapshot: impl Into<String>) -> Self {
        Self {
            snapshot: snapshot.into(),
            available_tools: Vec::new(),
            terminal: true,
            info: serde_json::Value::Null,
        }
    }
}

/// A single agent decision: which tool to call, with what parameters, and
/// which decision components produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Identifier of the selected tool.
    pub tool: String,
    /// Parameters for the tool call.
    pub parameters: serde_json::Value,
    /// The components that participated in producing this decision.
    pub components: Vec<DecisionComponent>,
}

impl Decision {
    pub fn new(tool: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            parameters,
            components: vec![DecisionComponent::ToolSelection],
        }
    }

    pub fn with_components(mut self, components: Vec<DecisionComponent>) -> Self {
        self.components = components;
        self
    }
}

/// The environment's response to an applied decision.
///
/// A rejected action is ordinary data, not an error: the step is recorded
/// with the rejection reason and the episode continues. Whether the agent may
/// retry is the environment's business; a retry is simply the next step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// The observation after the action (or after its rejection).
    pub observation: EnvObservation,
    /// Rejection reason if the environment refused the call.
    pub rejected: Option<String>,
    /// Immediate, non-terminal signal for this transition.
    pub signal: f64,
}

impl ActionOutcome {
    pub fn accepted(observation: EnvObservation, signal: f64) -> Self {
        Self {
            observation,
            rejected: None,
            signal,
        }
    }

    pub fn rejected(observation: EnvObservation, reason: impl Into<String>) -> Self {
        Self {
            observation,
            rejected: Some(reason.into()),
            signal: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Environment trait
// ---------------------------------------------------------------------------

/// One episode's interaction surface.
///
/// Both methods are legitimate suspension points: implementations may talk to
/// external services. The collector owns the environment exclusively for the
/// episode and drops it afterwards, releasing whatever resources it held.
#[async_trait]
pub trait Environment: Send {
    /// The current state and the set of acceptable tools.
    async fn observe(&mut self) -> anyhow::Result<EnvObservation>;

    /// Apply one decision and return its effect.
    async fn apply(&mut self, decision: &Decision) -> anyhow::Result<ActionOutcome>;
}
