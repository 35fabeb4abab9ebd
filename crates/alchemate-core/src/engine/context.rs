use super::error::{CheckpointError, EngineError, StepError};
use crate::core::config::SimulationConfig;
use crate::core::system::{SimulationData, SystemHandle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name used for checkpoints stored next to the simulation output.
pub const CHECKPOINT_FILE: &str = "alchemate_context.toml";

/// The single source of truth a workflow run reads from and writes to.
///
/// A context is owned by exactly one run at a time. Steps mutate it in place; the manager
/// appends to `completed_steps` after each success, which is what makes resumption possible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulationContext {
    completed_steps: Vec<String>,
    system: SystemHandle,
    config: SimulationConfig,
    simulation_data: Option<SimulationData>,
}

impl SimulationContext {
    pub fn new(system: SystemHandle, config: SimulationConfig) -> Self {
        debug!(
            system = %system.path().display(),
            output = %config.output_directory.display(),
            "Simulation context initialized."
        );
        Self {
            completed_steps: Vec::new(),
            system,
            config,
            simulation_data: None,
        }
    }

    pub fn system(&self) -> &SystemHandle {
        &self.system
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SimulationConfig {
        &mut self.config
    }

    pub fn simulation_data(&self) -> Option<&SimulationData> {
        self.simulation_data.as_ref()
    }

    pub fn simulation_data_mut(&mut self) -> Option<&mut SimulationData> {
        self.simulation_data.as_mut()
    }

    /// Returns the simulation data, or a precondition error naming `requirement`.
    pub fn require_simulation_data(
        &self,
        requirement: &str,
    ) -> Result<&SimulationData, StepError> {
        self.simulation_data
            .as_ref()
            .ok_or_else(|| StepError::precondition(requirement))
    }

    pub fn require_simulation_data_mut(
        &mut self,
        requirement: &str,
    ) -> Result<&mut SimulationData, StepError> {
        self.simulation_data
            .as_mut()
            .ok_or_else(|| StepError::precondition(requirement))
    }

    /// Stores the data produced by a base step, replacing any earlier value.
    pub fn set_simulation_data(&mut self, data: SimulationData) {
        if self.simulation_data.is_some() {
            warn!("Overwriting existing simulation data in the workflow context.");
        }
        self.simulation_data = Some(data);
    }

    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    pub fn has_completed(&self, identifier: &str) -> bool {
        self.completed_steps.iter().any(|s| s == identifier)
    }

    /// Appends `identifier` to the completion history.
    ///
    /// Recording the same identifier twice is an internal invariant violation and leaves the
    /// history unchanged.
    pub fn record_completion(&mut self, identifier: &str) -> Result<(), EngineError> {
        if self.has_completed(identifier) {
            return Err(EngineError::DuplicateCompletion {
                step: identifier.to_string(),
            });
        }
        self.completed_steps.push(identifier.to_string());
        Ok(())
    }

    pub fn default_checkpoint_path(&self) -> PathBuf {
        self.config.output_directory.join(CHECKPOINT_FILE)
    }

    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let content = toml::to_string_pretty(self)?;
        let io_err = |source| CheckpointError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, content).map_err(io_err)?;
        debug!(path = %path.display(), "Workflow context checkpoint written.");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let content = std::fs::read_to_string(path).map_err(|source| CheckpointError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CheckpointError::Deserialize {
            path: path.to_string_lossy().to_string(),
            source,
        })
    }
}
