//! Run lifecycle management for external callers.
//!
//! The [`RunManager`] is the boundary a CLI or dashboard talks to: start a
//! run on a named scenario, poll its progress, cancel it, and claim the final
//! result. Each run executes on its own tokio task with its own learner
//! instance, so independent runs can proceed concurrently without sharing any
//! mutable policy state; within a run, episodes stay strictly sequential.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::config::OrchestratorConfig;
use crate::error::TrainError;
use crate::learner::PolicyLearner;
use crate::scenario::registry::ScenarioRegistry;

use super::accumulator::{ProgressSnapshot, ResultAccumulator};
use super::orchestrator::TrainingOrchestrator;
use super::result::TrainingResult;

/// Opaque reference to a started run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunHandle {
    id: String,
}

impl RunHandle {
    /// The run identifier, matching the training result's `run_id`.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

struct RunEntry {
    accumulator: Arc<ResultAccumulator>,
    cancel: CancelToken,
    task: Option<JoinHandle<Result<TrainingResult, TrainError>>>,
}

/// Starts, observes, cancels, and joins training runs.
pub struct RunManager {
    registry: Arc<ScenarioRegistry>,
    orchestrator: TrainingOrchestrator,
    runs: Mutex<HashMap<String, RunEntry>>,
}

impl RunManager {
    pub fn new(registry: Arc<ScenarioRegistry>, config: OrchestratorConfig) -> Self {
        Self {
            registry,
            orchestrator: TrainingOrchestrator::new(config),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Start a run of `episode_count` episodes on the named scenario.
    ///
    /// Scenario lookup and trainable-map validation happen here, before any
    /// episode executes; the run itself proceeds on a background task.
    pub fn start_run(
        &self,
        scenario_name: &str,
        episode_count: usize,
        mut learner: Box<dyn PolicyLearner>,
    ) -> Result<RunHandle, TrainError> {
        let scenario = self.registry.get(scenario_name)?;
        scenario
            .trainable_components()
            .validate(scenario.name())?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let accumulator = Arc::new(ResultAccumulator::new());
        let cancel = CancelToken::new();

        let orchestrator = self.orchestrator.clone();
        let task_accumulator = accumulator.clone();
        let task_cancel = cancel.clone();
        let task_run_id = run_id.clone();
        let task = tokio::spawn(async move {
            orchestrator
                .run_with_id(
                    task_run_id,
                    scenario.as_ref(),
                    learner.as_mut(),
                    episode_count,
                    &task_accumulator,
                    &task_cancel,
                )
                .await
        });

        self.runs.lock().expect("run table lock poisoned").insert(
            run_id.clone(),
            RunEntry {
                accumulator,
                cancel,
                task: Some(task),
            },
        );

        tracing::info!(run = %run_id, scenario = scenario_name, episodes = episode_count, "run started");
        Ok(RunHandle { id: run_id })
    }

    /// Current progress for a run. Mid-run values are snapshots; once the
    /// state is terminal they are final.
    pub fn get_status(&self, handle: &RunHandle) -> Result<ProgressSnapshot, TrainError> {
        let runs = self.runs.lock().expect("run table lock poisoned");
        let entry = runs
            .get(&handle.id)
            .ok_or_else(|| TrainError::UnknownRun(handle.id.clone()))?;
        Ok(entry.accumulator.snapshot())
    }

    /// Request cancellation. The run aborts its current episode at the next
    /// suspension point and terminates in the `Cancelled` state.
    pub fn cancel(&self, handle: &RunHandle) -> Result<(), TrainError> {
        let runs = self.runs.lock().expect("run table lock poisoned");
        let entry = runs
            .get(&handle.id)
            .ok_or_else(|| TrainError::UnknownRun(handle.id.clone()))?;
        entry.cancel.cancel();
        tracing::info!(run = %handle.id, "cancellation requested");
        Ok(())
    }

    /// Wait for the run to finish and claim its result. The result can be
    /// claimed exactly once; status queries keep working afterwards.
    pub async fn join(&self, handle: &RunHandle) -> Result<TrainingResult, TrainError> {
        let task = {
            let mut runs = self.runs.lock().expect("run table lock poisoned");
            let entry = runs
                .get_mut(&handle.id)
                .ok_or_else(|| TrainError::UnknownRun(handle.id.clone()))?;
            entry
                .task
                .take()
                .ok_or_else(|| TrainError::RunAborted("result already claimed".to_string()))?
        };

        match task.await {
            Ok(result) => result,
            Err(e) => Err(TrainError::RunAborted(e.to_string())),
        }
    }
}
