//! Trajectory data model and live episode collection.

pub mod collector;
pub mod types;

pub use collector::{CollectAbort, TrajectoryCollector};
pub use types::{
    ComponentMark, DecisionComponent, Outcome, RewardVector, Step, Trajectory,
};
