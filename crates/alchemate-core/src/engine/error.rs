use thiserror::Error;

use super::backend::BackendError;
use crate::core::config::ConfigError;
use crate::core::io::ReadError;
use crate::core::units::UnitError;

/// Failure raised by a single step while it runs.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Precondition not met: {requirement}")]
    Precondition { requirement: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

impl StepError {
    pub fn precondition(requirement: impl Into<String>) -> Self {
        Self::Precondition {
            requirement: requirement.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to serialize workflow context: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to parse checkpoint '{path}': {source}")]
    Deserialize {
        path: String,
        source: toml::de::Error,
    },
}

/// Failure of a workflow run, always attributed to the step that caused it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Step '{step}' precondition not met: {requirement}")]
    Precondition { step: String, requirement: String },

    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: StepError,
    },

    #[error("Internal logic error: step '{step}' is already recorded as completed")]
    DuplicateCompletion { step: String },

    #[error("Post-processing step '{step}' is scheduled before any base step")]
    InvalidOrdering { step: String },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl EngineError {
    /// Attributes a step failure to the step that produced it.
    pub fn from_step(step: &str, error: StepError) -> Self {
        match error {
            StepError::Precondition { requirement } => EngineError::Precondition {
                step: step.to_string(),
                requirement,
            },
            source => EngineError::StepFailed {
                step: step.to_string(),
                source,
            },
        }
    }

    /// The identifier of the offending step, when the failure belongs to one.
    pub fn step(&self) -> Option<&str> {
        match self {
            EngineError::Precondition { step, .. }
            | EngineError::StepFailed { step, .. }
            | EngineError::DuplicateCompletion { step }
            | EngineError::InvalidOrdering { step } => Some(step),
            EngineError::Checkpoint(_) => None,
        }
    }
}
