//! Name-to-scenario lookup.
//!
//! The registry is an explicit immutable mapping populated at process start.
//! There is no runtime plugin discovery: what was registered before the first
//! run is what exists. Registration is also where task definitions are
//! validated, so an all-frozen component map is rejected before any episode
//! could execute.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::TrainError;

use super::traits::Scenario;

/// Immutable name → scenario mapping, shared by reference with run callers.
#[derive(Default)]
pub struct ScenarioRegistry {
    scenarios: BTreeMap<String, Arc<dyn Scenario>>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scenario under its own name.
    ///
    /// Fails if the name is taken or the scenario's trainable-component map
    /// declares nothing trainable.
    pub fn register(&mut self, scenario: Arc<dyn Scenario>) -> Result<(), TrainError> {
        let name = scenario.name().to_string();
        scenario.trainable_components().validate(&name)?;
        if self.scenarios.contains_key(&name) {
            return Err(TrainError::DuplicateScenario { name });
        }
        tracing::debug!(scenario = %name, version = scenario.version(), "registered scenario");
        self.scenarios.insert(name, scenario);
        Ok(())
    }

    /// Look up a scenario by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Scenario>, TrainError> {
        self.scenarios
            .get(name)
            .cloned()
            .ok_or_else(|| TrainError::ScenarioNotFound(name.to_string()))
    }

    /// All registered scenario names, in stable order.
    pub fn list(&self) -> Vec<String> {
        self.scenarios.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
