//! The per-run control loop.
//!
//! For every episode index, in strict order: acquire a fresh environment from
//! the scenario, collect a live trajectory with the learner's current
//! parameters, evaluate the terminal outcome, broadcast it into per-step
//! rewards, submit the pair to the learner, and append the episode record.
//! The loop is strictly sequential -- every episode must observe the
//! parameters produced by all prior updates, so episodes of one run are never
//! reordered or overlapped.
//!
//! Per-episode failures are caught here and recorded; only systemic problems
//! (consecutive environment failures over the threshold, or an update that
//! still fails after its retry) terminate the run, and even then the partial
//! episode log is preserved on the returned result.

use std::time::{Duration, Instant};

use chrono::Utc;

use crate::cancel::CancelToken;
use crate::config::OrchestratorConfig;
use crate::error::{EpisodeFault, TrainError};
use crate::learner::PolicyLearner;
use crate::reward::RewardBroadcaster;
use crate::scenario::traits::Scenario;
use crate::trajectory::collector::{CollectAbort, TrajectoryCollector};
use crate::trajectory::types::{Outcome, RewardVector, Trajectory};

use super::accumulator::ResultAccumulator;
use super::result::{AggregateMetrics, EpisodeRecord, RunState, TrainingResult};

/// Drives one training run from `Idle` to a terminal state.
#[derive(Clone)]
pub struct TrainingOrchestrator {
    config: OrchestratorConfig,
    broadcaster: RewardBroadcaster,
}

/// How one episode ended, before it becomes a record.
enum EpisodeEnd {
    Recorded(EpisodeRecord),
    Cancelled,
    Fatal { record: Option<EpisodeRecord>, error: TrainError },
}

impl TrainingOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            broadcaster: RewardBroadcaster::uniform(),
        }
    }

    /// Replace the default uniform broadcaster, e.g. to install a per-step
    /// weighting function.
    pub fn with_broadcaster(mut self, broadcaster: RewardBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Execute `episode_count` episodes of `scenario` against `learner`.
    ///
    /// Fails fast (before any episode) if the scenario's trainable map is
    /// invalid. Once running, every termination path returns a
    /// [`TrainingResult`]: `Completed` after all episodes, `Failed` with the
    /// partial log on a fatal condition, `Cancelled` when the token fires.
    pub async fn run(
        &self,
        scenario: &dyn Scenario,
        learner: &mut dyn PolicyLearner,
        episode_count: usize,
        accumulator: &ResultAccumulator,
        cancel: &CancelToken,
    ) -> Result<TrainingResult, TrainError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.run_with_id(run_id, scenario, learner, episode_count, accumulator, cancel)
            .await
    }

    /// [`run`](Self::run) with a caller-chosen run identifier, so a run
    /// handle can be issued before the run starts.
    pub async fn run_with_id(
        &self,
        run_id: String,
        scenario: &dyn Scenario,
        learner: &mut dyn PolicyLearner,
        episode_count: usize,
        accumulator: &ResultAccumulator,
        cancel: &CancelToken,
    ) -> Result<TrainingResult, TrainError> {
        let scope = scenario.trainable_components();
        scope.validate(scenario.name())?;

        let started_at = Utc::now();
        accumulator.begin(episode_count, scenario.success_threshold());

        tracing::info!(
            run = %run_id,
            scenario = %scenario.name(),
            episodes = episode_count,
            "starting training run"
        );

        let collector =
            TrajectoryCollector::new(scenario.name(), self.config.max_steps_per_episode);

        let mut final_state = RunState::Completed;
        let mut fault_msg: Option<String> = None;
        let mut consecutive_env_failures = 0usize;

        for index in 0..episode_count {
            if cancel.is_cancelled() {
                final_state = RunState::Cancelled;
                break;
            }

            let end = self
                .run_episode(
                    index,
                    scenario,
                    learner,
                    &collector,
                    cancel,
                    &mut consecutive_env_failures,
                )
                .await;

            match end {
                EpisodeEnd::Recorded(record) => {
                    tracing::info!(
                        run = %run_id,
                        episode = index,
                        outcome = ?record.outcome,
                        steps = record.steps,
                        duration_ms = record.duration_ms,
                        fault = record.fault.as_ref().map(|f| f.to_string()),
                        "episode recorded"
                    );
                    accumulator.append(record);
                }
                EpisodeEnd::Cancelled => {
                    final_state = RunState::Cancelled;
                    break;
                }
                EpisodeEnd::Fatal { record, error } => {
                    if let Some(record) = record {
                        accumulator.append(record);
                    }
                    tracing::error!(run = %run_id, episode = index, error = %error, "run failed");
                    final_state = RunState::Failed;
                    fault_msg = Some(error.to_string());
                    break;
                }
            }
        }

        if final_state == RunState::Cancelled {
            tracing::warn!(run = %run_id, "run cancelled");
        }

        let artifact = match learner.export_parameters() {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::warn!(run = %run_id, error = %e, "failed to export learner parameters");
                None
            }
        };

        accumulator.set_state(final_state);
        let records = accumulator.records();
        let metrics = AggregateMetrics::from_records(&records, scenario.success_threshold());

        let result = TrainingResult {
            run_id: run_id.clone(),
            scenario: scenario.name().to_string(),
            scenario_version: scenario.version().to_string(),
            state: final_state,
            planned_episodes: episode_count,
            episodes: records,
            metrics,
            artifact,
            fault: fault_msg,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            run = %run_id,
            state = %result.state,
            episodes = result.episodes.len(),
            mean_outcome = result.metrics.mean_outcome,
            success_rate = result.metrics.success_rate,
            "training run finished"
        );

        Ok(result)
    }

    /// One full episode: environment acquisition through learner update.
    async fn run_episode(
        &self,
        index: usize,
        scenario: &dyn Scenario,
        learner: &mut dyn PolicyLearner,
        collector: &TrajectoryCollector,
        cancel: &CancelToken,
        consecutive_env_failures: &mut usize,
    ) -> EpisodeEnd {
        let episode_start = Instant::now();

        let mut env = match scenario.create_environment().await {
            Ok(env) => {
                *consecutive_env_failures = 0;
                env
            }
            Err(e) => {
                *consecutive_env_failures += 1;
                tracing::warn!(
                    episode = index,
                    consecutive = *consecutive_env_failures,
                    error = %e,
                    "environment initialization failed, skipping episode"
                );
                let record = EpisodeRecord {
                    index,
                    outcome: Outcome::Undefined,
                    rewards: RewardVector::empty(),
                    duration_ms: episode_start.elapsed().as_millis() as u64,
                    steps: 0,
                    fault: Some(EpisodeFault::EnvironmentInit {
                        message: e.message.clone(),
                    }),
                };
                let threshold = self.config.consecutive_failure_threshold;
                if *consecutive_env_failures >= threshold {
                    return EpisodeEnd::Fatal {
                        record: Some(record),
                        error: TrainError::ConsecutiveFailures {
                            count: *consecutive_env_failures,
                            threshold,
                        },
                    };
                }
                return EpisodeEnd::Recorded(record);
            }
        };

        let scope = scenario.trainable_components();
        let collected = match self.config.episode_timeout_ms {
            Some(budget_ms) => {
                let budget = Duration::from_millis(budget_ms);
                match tokio::time::timeout(
                    budget,
                    collector.collect(env.as_mut(), learner, scope, cancel),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        // The in-flight episode is dropped with its partial
                        // trajectory; the environment is released below.
                        return EpisodeEnd::Recorded(EpisodeRecord {
                            index,
                            outcome: Outcome::Score(scenario.failure_outcome()),
                            rewards: RewardVector::empty(),
                            duration_ms: episode_start.elapsed().as_millis() as u64,
                            steps: 0,
                            fault: Some(EpisodeFault::TimedOut { budget_ms }),
                        });
                    }
                }
            }
            None => collector.collect(env.as_mut(), learner, scope, cancel).await,
        };
        drop(env);

        let mut trajectory = match collected {
            Ok(trajectory) => trajectory,
            Err(CollectAbort::Cancelled) => return EpisodeEnd::Cancelled,
            Err(CollectAbort::Fault(fault)) => {
                return EpisodeEnd::Recorded(EpisodeRecord {
                    index,
                    outcome: Outcome::Undefined,
                    rewards: RewardVector::empty(),
                    duration_ms: episode_start.elapsed().as_millis() as u64,
                    steps: 0,
                    fault: Some(fault),
                });
            }
        };

        let (outcome, fault) = if trajectory.truncated {
            (
                Outcome::Score(scenario.failure_outcome()),
                Some(EpisodeFault::StepLimitExceeded {
                    limit: self.config.max_steps_per_episode,
                }),
            )
        } else {
            let outcome = match scenario.evaluate_outcome(&trajectory) {
                Outcome::Score(v) => Outcome::from_score(v),
                Outcome::Undefined => Outcome::Undefined,
            };
            (outcome, None)
        };
        trajectory.finalize(outcome);

        let rewards = self.broadcaster.broadcast(&trajectory);
        debug_assert!(rewards.aligns_with(&trajectory));

        if let Err(error) = self
            .submit_update(learner, &trajectory, &rewards, scope, cancel)
            .await
        {
            let record = EpisodeRecord {
                index,
                outcome,
                rewards,
                duration_ms: episode_start.elapsed().as_millis() as u64,
                steps: trajectory.len(),
                fault,
            };
            return match error {
                SubmitEnd::Cancelled => EpisodeEnd::Cancelled,
                SubmitEnd::Fatal(e) => EpisodeEnd::Fatal {
                    record: Some(record),
                    error: TrainError::Update(e),
                },
            };
        }

        EpisodeEnd::Recorded(EpisodeRecord {
            index,
            outcome,
            rewards,
            duration_ms: episode_start.elapsed().as_millis() as u64,
            steps: trajectory.len(),
            fault,
        })
    }

    /// Submit one update, retrying per configuration before declaring the
    /// failure fatal.
    async fn submit_update(
        &self,
        learner: &mut dyn PolicyLearner,
        trajectory: &Trajectory,
        rewards: &RewardVector,
        scope: &crate::scenario::traits::TrainableMap,
        cancel: &CancelToken,
    ) -> Result<(), SubmitEnd> {
        let mut attempts = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SubmitEnd::Cancelled),
                r = learner.update(trajectory, rewards, scope) => r,
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempts < self.config.update_retries => {
                    attempts += 1;
                    tracing::warn!(
                        trajectory = %trajectory.id,
                        attempt = attempts,
                        error = %e,
                        "learner update failed, retrying"
                    );
                }
                Err(e) => return Err(SubmitEnd::Fatal(e)),
            }
        }
    }
}

enum SubmitEnd {
    Cancelled,
    Fatal(crate::error::UpdateError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ActionOutcome, Decision, EnvObservation, Environment};
    use crate::error::{EnvironmentInitError, UpdateError};
    use crate::learner::FrozenLearner;
    use crate::scenario::traits::TrainableMap;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Environment that terminates after a fixed number of decisions; the
    /// final tool choice decides success.
    struct ScriptedEnv {
        remaining: usize,
    }

    #[async_trait]
    impl Environment for ScriptedEnv {
        async fn observe(&mut self) -> anyhow::Result<EnvObservation> {
            if self.remaining == 0 {
                Ok(EnvObservation::terminal("done"))
            } else {
                Ok(EnvObservation::new(
                    format!("remaining-{}", self.remaining),
                    vec!["resolve".into(), "defer".into()],
                ))
            }
        }

        async fn apply(&mut self, _decision: &Decision) -> anyhow::Result<ActionOutcome> {
            self.remaining -= 1;
            let obs = if self.remaining == 0 {
                EnvObservation::terminal("done")
            } else {
                EnvObservation::new(
                    format!("remaining-{}", self.remaining),
                    vec!["resolve".into(), "defer".into()],
                )
            };
            Ok(ActionOutcome::accepted(obs, 0.0))
        }
    }

    /// Scenario with a programmable environment-failure schedule.
    struct ScriptedScenario {
        map: TrainableMap,
        steps_per_episode: usize,
        /// `true` at position i means the i-th `create_environment` call fails.
        failure_schedule: Vec<bool>,
        episode_counter: AtomicUsize,
        outcome: Outcome,
    }

    impl ScriptedScenario {
        fn new(steps_per_episode: usize, outcome: Outcome) -> Self {
            Self {
                map: TrainableMap::all_trainable(),
                steps_per_episode,
                failure_schedule: Vec::new(),
                episode_counter: AtomicUsize::new(0),
                outcome,
            }
        }

        fn with_failure_schedule(mut self, schedule: Vec<bool>) -> Self {
            self.failure_schedule = schedule;
            self
        }
    }

    #[async_trait]
    impl Scenario for ScriptedScenario {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn create_environment(
            &self,
        ) -> Result<Box<dyn Environment>, EnvironmentInitError> {
            let call = self.episode_counter.fetch_add(1, Ordering::SeqCst);
            if self.failure_schedule.get(call).copied().unwrap_or(false) {
                return Err(EnvironmentInitError::new("scheduled failure"));
            }
            Ok(Box::new(ScriptedEnv {
                remaining: self.steps_per_episode,
            }))
        }

        fn evaluate_outcome(&self, _trajectory: &Trajectory) -> Outcome {
            self.outcome
        }

        fn trainable_components(&self) -> &TrainableMap {
            &self.map
        }
    }

    /// Learner whose updates fail a configurable number of times.
    struct FlakyLearner {
        inner: FrozenLearner,
        failures_remaining: usize,
        updates_attempted: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PolicyLearner for FlakyLearner {
        async fn act(
            &self,
            observation: &EnvObservation,
            scope: &TrainableMap,
        ) -> anyhow::Result<Decision> {
            self.inner.act(observation, scope).await
        }

        async fn update(
            &mut self,
            trajectory: &Trajectory,
            rewards: &RewardVector,
            scope: &TrainableMap,
        ) -> Result<(), UpdateError> {
            self.updates_attempted.fetch_add(1, Ordering::SeqCst);
            if self.failures_remaining > 0 {
                self.failures_remaining -= 1;
                return Err(UpdateError::new("transient sync failure"));
            }
            self.inner.update(trajectory, rewards, scope).await
        }

        fn export_parameters(&self) -> anyhow::Result<Option<std::path::PathBuf>> {
            Ok(None)
        }
    }

    fn orchestrator() -> TrainingOrchestrator {
        TrainingOrchestrator::new(OrchestratorConfig {
            max_steps_per_episode: 10,
            episode_timeout_ms: Some(5_000),
            consecutive_failure_threshold: 3,
            update_retries: 1,
        })
    }

    async fn run_simple(
        scenario: &ScriptedScenario,
        episodes: usize,
    ) -> TrainingResult {
        let mut learner = FrozenLearner::new();
        orchestrator()
            .run(
                scenario,
                &mut learner,
                episodes,
                &ResultAccumulator::new(),
                &CancelToken::new(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn zero_episodes_completes_immediately() {
        let scenario = ScriptedScenario::new(2, Outcome::Score(1.0));
        let result = run_simple(&scenario, 0).await;
        assert_eq!(result.state, RunState::Completed);
        assert!(result.episodes.is_empty());
        assert_eq!(result.metrics.mean_outcome, None);
    }

    #[tokio::test]
    async fn completes_and_records_every_episode_in_order() {
        let scenario = ScriptedScenario::new(2, Outcome::Score(1.0));
        let result = run_simple(&scenario, 4).await;

        assert_eq!(result.state, RunState::Completed);
        assert_eq!(result.episodes.len(), 4);
        for (i, record) in result.episodes.iter().enumerate() {
            assert_eq!(record.index, i);
            assert_eq!(record.outcome, Outcome::Score(1.0));
            assert_eq!(record.steps, 2);
            assert_eq!(record.rewards.len(), 2);
        }
        assert_eq!(result.metrics.success_rate, Some(1.0));
    }

    #[tokio::test]
    async fn reward_vectors_match_trajectory_lengths() {
        let scenario = ScriptedScenario::new(3, Outcome::Score(0.5));
        let result = run_simple(&scenario, 2).await;
        for record in &result.episodes {
            assert_eq!(record.rewards.len(), record.steps);
            assert_eq!(record.rewards.scores(), Some(vec![0.5; record.steps]));
        }
    }

    #[tokio::test]
    async fn env_failures_below_threshold_skip_episodes_only() {
        let scenario = ScriptedScenario::new(2, Outcome::Score(1.0))
            .with_failure_schedule(vec![false, true, false]);
        let result = run_simple(&scenario, 3).await;

        assert_eq!(result.state, RunState::Completed);
        assert_eq!(result.episodes.len(), 3);
        assert_eq!(result.episodes[1].outcome, Outcome::Undefined);
        assert!(matches!(
            result.episodes[1].fault,
            Some(EpisodeFault::EnvironmentInit { .. })
        ));
        // The skipped episode is excluded from aggregates.
        assert_eq!(result.metrics.episodes_counted, 2);
        assert_eq!(result.metrics.episodes_excluded, 1);
    }

    #[tokio::test]
    async fn three_consecutive_env_failures_fail_the_run() {
        // Two healthy episodes, then an unbroken run of failures.
        let scenario = ScriptedScenario::new(2, Outcome::Score(1.0))
            .with_failure_schedule(vec![false, false, true, true, true, true]);
        let result = run_simple(&scenario, 10).await;

        assert_eq!(result.state, RunState::Failed);
        // 2 successes + exactly 3 failure records, then the run stopped.
        assert_eq!(result.episodes.len(), 5);
        assert_eq!(result.episodes[0].outcome, Outcome::Score(1.0));
        assert_eq!(result.episodes[1].outcome, Outcome::Score(1.0));
        for record in &result.episodes[2..] {
            assert!(matches!(
                record.fault,
                Some(EpisodeFault::EnvironmentInit { .. })
            ));
        }
        assert!(result.fault.as_ref().unwrap().contains("3 consecutive"));
    }

    #[tokio::test]
    async fn interleaved_success_resets_the_failure_counter() {
        // fail, fail, ok, fail, fail, ok -- never 3 in a row.
        let scenario = ScriptedScenario::new(1, Outcome::Score(1.0))
            .with_failure_schedule(vec![true, true, false, true, true, false]);
        let result = run_simple(&scenario, 6).await;

        assert_eq!(result.state, RunState::Completed);
        assert_eq!(result.episodes.len(), 6);
        assert_eq!(result.metrics.episodes_counted, 2);
    }

    #[tokio::test]
    async fn step_limit_records_failure_outcome() {
        // Environment needs 100 decisions; cap is 10.
        let scenario = ScriptedScenario::new(100, Outcome::Score(1.0));
        let result = run_simple(&scenario, 1).await;

        assert_eq!(result.state, RunState::Completed);
        let record = &result.episodes[0];
        assert_eq!(record.outcome, Outcome::Score(0.0));
        assert!(matches!(
            record.fault,
            Some(EpisodeFault::StepLimitExceeded { limit: 10 })
        ));
        assert_eq!(record.steps, 10);
    }

    #[tokio::test]
    async fn undefined_outcome_logged_but_excluded() {
        let scenario = ScriptedScenario::new(2, Outcome::Undefined);
        let result = run_simple(&scenario, 2).await;

        assert_eq!(result.state, RunState::Completed);
        assert_eq!(result.episodes.len(), 2);
        for record in &result.episodes {
            assert_eq!(record.outcome, Outcome::Undefined);
            assert!(record.rewards.is_skip());
            assert_eq!(record.rewards.len(), record.steps);
        }
        assert_eq!(result.metrics.episodes_counted, 0);
        assert_eq!(result.metrics.episodes_excluded, 2);
        assert_eq!(result.metrics.mean_outcome, None);
    }

    #[tokio::test]
    async fn update_failure_is_retried_once() {
        let scenario = ScriptedScenario::new(1, Outcome::Score(1.0));
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut learner = FlakyLearner {
            inner: FrozenLearner::new(),
            failures_remaining: 1,
            updates_attempted: attempts.clone(),
        };

        let result = orchestrator()
            .run(
                &scenario,
                &mut learner,
                1,
                &ResultAccumulator::new(),
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.state, RunState::Completed);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_update_failure_fails_the_run_with_partial_results() {
        let scenario = ScriptedScenario::new(1, Outcome::Score(1.0));
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut learner = FlakyLearner {
            inner: FrozenLearner::new(),
            failures_remaining: usize::MAX,
            updates_attempted: attempts.clone(),
        };

        let result = orchestrator()
            .run(
                &scenario,
                &mut learner,
                5,
                &ResultAccumulator::new(),
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.state, RunState::Failed);
        // Initial attempt + one retry, then fatal.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // The episode that triggered the failure is still in the log.
        assert_eq!(result.episodes.len(), 1);
        assert!(result.fault.is_some());
    }

    #[tokio::test]
    async fn all_frozen_scenario_rejected_before_any_episode() {
        let mut scenario = ScriptedScenario::new(1, Outcome::Score(1.0));
        scenario.map = TrainableMap::all_frozen();
        let mut learner = FrozenLearner::new();

        let err = orchestrator()
            .run(
                &scenario,
                &mut learner,
                3,
                &ResultAccumulator::new(),
                &CancelToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TrainError::NoTrainableComponents { .. }));
        assert_eq!(scenario.episode_counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pre_cancelled_run_terminates_in_cancelled_state() {
        let scenario = ScriptedScenario::new(2, Outcome::Score(1.0));
        let mut learner = FrozenLearner::new();
        let accumulator = ResultAccumulator::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = orchestrator()
            .run(&scenario, &mut learner, 3, &accumulator, &cancel)
            .await
            .unwrap();

        assert_eq!(result.state, RunState::Cancelled);
        assert!(result.episodes.is_empty());
        assert_eq!(accumulator.state(), RunState::Cancelled);
    }

    #[tokio::test]
    async fn frozen_learner_runs_are_deterministic() {
        // Same scenario semantics, frozen learner: reward vectors must be
        // byte-identical across runs.
        let first = run_simple(&ScriptedScenario::new(3, Outcome::Score(1.0)), 4).await;
        let second = run_simple(&ScriptedScenario::new(3, Outcome::Score(1.0)), 4).await;

        let rewards_of = |r: &TrainingResult| {
            r.episodes
                .iter()
                .map(|e| serde_json::to_string(&e.rewards).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(rewards_of(&first), rewards_of(&second));
    }
}
