//! Task definitions and their registry.
//!
//! A scenario bundles an environment factory, an outcome evaluator, and the
//! trainable-component declaration behind one trait, so the orchestrator can
//! train against any task without branching on its identity.
//!
//! Included scenarios:
//! - **support-sim** ([`support`]) -- seeded customer-support ticket
//!   simulation with lookup/resolution/reply tool flows.
//! - **toy-2-step** ([`toy`]) -- two fixed decisions, hand-checkable
//!   outcomes; the standard smoke-test target.

pub mod registry;
pub mod support;
pub mod toy;
pub mod traits;

pub use registry::ScenarioRegistry;
pub use support::CustomerSupportScenario;
pub use toy::TwoStepScenario;
pub use traits::{Scenario, TrainableMap};

use std::sync::Arc;

use crate::error::TrainError;

/// The registry with every built-in scenario registered.
pub fn builtin_registry(seed: u64) -> Result<ScenarioRegistry, TrainError> {
    let mut registry = ScenarioRegistry::new();
    registry.register(Arc::new(CustomerSupportScenario::new(seed)))?;
    registry.register(Arc::new(TwoStepScenario::new()))?;
    Ok(registry)
}
