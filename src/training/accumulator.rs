//! Shared, append-only episode log for an in-flight run.
//!
//! The orchestrator appends records as episodes finish; status callers read
//! snapshots concurrently through the run manager. A snapshot taken while
//! the run state is non-terminal is exactly that -- a point-in-time view, not
//! a stable value; aggregates only settle once the run reaches a terminal
//! state.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::result::{AggregateMetrics, EpisodeRecord, RunState};

/// A point-in-time view of run progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub state: RunState,
    /// Episode records appended so far.
    pub completed_episodes: usize,
    /// Episodes the run was asked to execute.
    pub planned_episodes: usize,
    /// Aggregates over the records appended so far. Stable only once
    /// `state` is terminal.
    pub metrics: AggregateMetrics,
}

#[derive(Debug)]
struct Inner {
    records: Vec<EpisodeRecord>,
    state: RunState,
    planned_episodes: usize,
    success_threshold: f64,
}

/// Append-only accumulator shared between a run and its observers.
#[derive(Debug)]
pub struct ResultAccumulator {
    inner: RwLock<Inner>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: Vec::new(),
                state: RunState::Idle,
                planned_episodes: 0,
                success_threshold: 1.0,
            }),
        }
    }

    /// Transition to `Running` and fix the episode plan and success
    /// threshold for this run.
    pub fn begin(&self, planned_episodes: usize, success_threshold: f64) {
        let mut inner = self.inner.write().expect("accumulator lock poisoned");
        inner.state = RunState::Running;
        inner.planned_episodes = planned_episodes;
        inner.success_threshold = success_threshold;
    }

    /// Append one episode record. Records arrive in episode-index order and
    /// are never modified afterwards.
    pub fn append(&self, record: EpisodeRecord) {
        let mut inner = self.inner.write().expect("accumulator lock poisoned");
        debug_assert!(
            inner.records.last().map_or(true, |r| r.index < record.index),
            "episode records must arrive in index order"
        );
        inner.records.push(record);
    }

    /// Move the run to a (typically terminal) state.
    pub fn set_state(&self, state: RunState) {
        self.inner.write().expect("accumulator lock poisoned").state = state;
    }

    pub fn state(&self) -> RunState {
        self.inner.read().expect("accumulator lock poisoned").state
    }

    /// Current progress. Mid-run this is a snapshot; after a terminal state
    /// it is the final view.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let inner = self.inner.read().expect("accumulator lock poisoned");
        ProgressSnapshot {
            state: inner.state,
            completed_episodes: inner.records.len(),
            planned_episodes: inner.planned_episodes,
            metrics: AggregateMetrics::from_records(&inner.records, inner.success_threshold),
        }
    }

    /// Clone out the full episode log.
    pub fn records(&self) -> Vec<EpisodeRecord> {
        self.inner
            .read()
            .expect("accumulator lock poisoned")
            .records
            .clone()
    }

    pub fn success_threshold(&self) -> f64 {
        self.inner
            .read()
            .expect("accumulator lock poisoned")
            .success_threshold
    }
}

impl Default for ResultAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
