//! Core trajectory data types.
//!
//! A [`Trajectory`] is the ordered record of one episode of live
//! agent-environment interaction: a sequence of [`Step`]s plus a terminal
//! [`Outcome`] set exactly once when the episode ends. Steps carry the
//! attribution needed for selective training: which decision components
//! produced the step, and whether each of them is trainable under the
//! scenario's component map.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Decision components
// ---------------------------------------------------------------------------

/// A decision-making sub-part of the agent.
///
/// Each step records which components produced it; the scenario's trainable
/// map decides which of them receive updates. Frozen components still execute
/// during collection, but their output is marked non-trainable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DecisionComponent {
    /// Choosing which tool to invoke.
    ToolSelection,
    /// Filling in the chosen tool's parameters.
    ParameterSelection,
    /// Executing the tool call itself.
    ToolExecution,
    /// Composing the final output from tool results.
    OutputGeneration,
}

impl DecisionComponent {
    /// Stable identifier used in configuration and serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolSelection => "tool_selection",
            Self::ParameterSelection => "parameter_selection",
            Self::ToolExecution => "tool_execution",
            Self::OutputGeneration => "output_generation",
        }
    }

    /// All components, in declaration order.
    pub fn all() -> [DecisionComponent; 4] {
        [
            Self::ToolSelection,
            Self::ParameterSelection,
            Self::ToolExecution,
            Self::OutputGeneration,
        ]
    }

    /// Parse from the stable identifier (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tool_selection" => Some(Self::ToolSelection),
            "parameter_selection" => Some(Self::ParameterSelection),
            "tool_execution" => Some(Self::ToolExecution),
            "output_generation" => Some(Self::OutputGeneration),
            _ => None,
        }
    }
}

impl std::fmt::Display for DecisionComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A component's participation in a step, tagged with its training status at
/// collection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMark {
    pub component: DecisionComponent,
    /// Whether this component's output may be updated by the learner.
    pub trainable: bool,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The terminal, scalar outcome of an episode.
///
/// `Undefined` is the sentinel for "the evaluator could not compute an
/// outcome": such episodes stay in the raw log but are excluded from
/// aggregate metrics, and their reward vectors instruct the learner to skip
/// the trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    Score(f64),
    Undefined,
}

impl Outcome {
    /// Build an outcome from a raw evaluator score. NaN is normalized to the
    /// undefined sentinel, since a NaN outcome cannot be compared against a
    /// success threshold or averaged.
    pub fn from_score(score: f64) -> Self {
        if score.is_nan() {
            Self::Undefined
        } else {
            Self::Score(score)
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Score(_))
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Score(v) => Some(*v),
            Self::Undefined => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One decision point within an episode.
///
/// Steps are appended in strict chronological order and are immutable once
/// appended. A step whose action the environment refused carries the
/// rejection reason in `rejected`; retries, where the environment allows
/// them, appear as separate steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Zero-based position within the trajectory.
    pub index: usize,
    /// Snapshot of the observed state the decision was based on.
    pub snapshot: String,
    /// Identifier of the selected tool or action.
    pub tool: String,
    /// Parameters the agent supplied for the tool call.
    pub parameters: serde_json::Value,
    /// The decision components that produced this step, with their training
    /// status under the scenario's component map.
    pub components: Vec<ComponentMark>,
    /// Rejection reason when the environment refused the action.
    pub rejected: Option<String>,
    /// Immediate, non-terminal signal emitted by the environment for this
    /// transition. Distinct from the per-step learning reward, which is
    /// produced by broadcasting the terminal outcome.
    pub signal: f64,
}

// ---------------------------------------------------------------------------
// Trajectory
// ---------------------------------------------------------------------------

/// The complete record of one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Name of the scenario that produced this episode.
    pub scenario: String,
    /// Ordered decision steps. Invariant: at least one step once the episode
    /// has been collected.
    pub steps: Vec<Step>,
    /// Terminal outcome; `None` until the episode reaches a terminal
    /// condition, then set exactly once.
    pub outcome: Option<Outcome>,
    /// True when collection stopped at the step cap rather than on an
    /// environment terminal signal.
    pub truncated: bool,
}

impl Trajectory {
    /// Create an empty trajectory for the given scenario.
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            scenario: scenario.into(),
            steps: Vec::new(),
            outcome: None,
            truncated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Append the next step. Steps must arrive in index order.
    pub fn push(&mut self, step: Step) {
        debug_assert_eq!(step.index, self.steps.len(), "steps must arrive in order");
        self.steps.push(step);
    }

    /// Set the terminal outcome. The first call wins; the outcome of a
    /// finished episode never changes.
    pub fn finalize(&mut self, outcome: Outcome) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }
}

// ---------------------------------------------------------------------------
// Reward vector
// ---------------------------------------------------------------------------

/// Per-step learning signal aligned one-to-one with a trajectory's steps.
///
/// Produced by the reward broadcaster; by construction its length equals the
/// trajectory's step count, and a length mismatch anywhere downstream is a
/// contract violation, not a recoverable condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardVector {
    values: Vec<Outcome>,
}

impl RewardVector {
    pub(crate) fn new(values: Vec<Outcome>) -> Self {
        Self { values }
    }

    /// An empty vector, used for episodes that never produced a step.
    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Outcome> {
        self.values.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Outcome> {
        self.values.iter()
    }

    /// The per-step scores, or `None` if the vector carries the undefined
    /// sentinel (in which case the learner must skip the trajectory).
    pub fn scores(&self) -> Option<Vec<f64>> {
        self.values.iter().map(|o| o.score()).collect()
    }

    /// True when this vector instructs the learner to skip the trajectory.
    pub fn is_skip(&self) -> bool {
        self.values.iter().any(|o| !o.is_defined())
    }

    /// Length contract against the trajectory this vector was built for.
    pub fn aligns_with(&self, trajectory: &Trajectory) -> bool {
        self.values.len() == trajectory.len()
    }
}
