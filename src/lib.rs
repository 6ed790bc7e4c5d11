//! Filament: on-policy training orchestration for tool-using agents.
//!
//! The crate drives live training runs: a scenario declares a task (an
//! environment factory, an outcome evaluator, and which decision components
//! are trainable), the collector records one episode at a time with the
//! policy's current parameters, the broadcaster turns each terminal outcome
//! into a per-step reward vector, and the orchestrator feeds both to a
//! pluggable policy learner while accumulating the run's episode log.

pub mod cancel;
pub mod config;
pub mod env;
pub mod error;
pub mod learner;
pub mod reward;
pub mod scenario;
pub mod store;
pub mod training;
pub mod trajectory;
