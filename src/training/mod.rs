//! The training run machinery: orchestration loop, episode log, run-level
//! results, and the run-management boundary for external callers.

pub mod accumulator;
pub mod orchestrator;
pub mod result;
pub mod runs;

pub use accumulator::{ProgressSnapshot, ResultAccumulator};
pub use orchestrator::TrainingOrchestrator;
pub use result::{AggregateMetrics, EpisodeRecord, RunState, TrainingResult};
pub use runs::{RunHandle, RunManager};
