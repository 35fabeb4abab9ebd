use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Opaque reference to the simulation input, typically a serialized system file.
///
/// Only the backend interprets the referenced file; the engine just carries the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHandle {
    path: PathBuf,
}

impl SystemHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// State established by a base step and consumed by post-processing steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulationData {
    pub output_directory: PathBuf,
    pub runtime: String,
    pub lambda_values: Vec<f64>,
    /// Total number of backend launches, restarts included.
    pub attempts: usize,
    pub converged: Option<bool>,
    pub free_energy_std: Option<f64>,
}

impl SimulationData {
    pub fn new(output_directory: impl Into<PathBuf>, runtime: impl Into<String>) -> Self {
        Self {
            output_directory: output_directory.into(),
            runtime: runtime.into(),
            lambda_values: Vec::new(),
            attempts: 0,
            converged: None,
            free_energy_std: None,
        }
    }
}
