use super::units::{LengthQuantity, TemperatureQuantity, TimeQuantity, UnitError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_CUTOFF: &str = "7.5A";
const DEFAULT_RUNTIME: &str = "1ns";
const DEFAULT_TEMPERATURE: &str = "298K";
const DEFAULT_NUM_LAMBDA: usize = 11;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            parameter,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CutoffType {
    #[serde(rename = "PME")]
    Pme,
    #[serde(rename = "RF")]
    ReactionField,
}

impl fmt::Display for CutoffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CutoffType::Pme => write!(f, "PME"),
            CutoffType::ReactionField => write!(f, "RF"),
        }
    }
}

impl FromStr for CutoffType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PME" => Ok(CutoffType::Pme),
            "RF" | "REACTION-FIELD" => Ok(CutoffType::ReactionField),
            other => Err(ConfigError::invalid(
                "cutoff_type",
                format!("expected 'PME' or 'RF', got '{}'", other),
            )),
        }
    }
}

/// Configuration handed to the simulation backend.
///
/// The engine treats this record as a pass-through blob: steps may adjust individual fields
/// (for example extending `runtime` or replacing the lambda schedule) but the meaning of each
/// field belongs to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulationConfig {
    pub cutoff_type: CutoffType,
    pub cutoff: String,
    pub runtime: String,
    pub temperature: String,
    pub replica_exchange: bool,
    pub num_lambda: usize,
    pub lambda_values: Option<Vec<f64>>,
    pub output_directory: PathBuf,
    pub restart: bool,
}

impl SimulationConfig {
    /// The lambda schedule the backend will simulate: the explicit values when set, otherwise
    /// `num_lambda` evenly spaced windows over `[0, 1]`.
    pub fn lambda_schedule(&self) -> Vec<f64> {
        match &self.lambda_values {
            Some(values) => values.clone(),
            None => evenly_spaced_lambdas(self.num_lambda),
        }
    }

    pub fn runtime_quantity(&self) -> Result<TimeQuantity, UnitError> {
        self.runtime.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cutoff
            .parse::<LengthQuantity>()
            .map_err(|e| ConfigError::invalid("cutoff", e.to_string()))?;
        self.runtime
            .parse::<TimeQuantity>()
            .map_err(|e| ConfigError::invalid("runtime", e.to_string()))?;
        self.temperature
            .parse::<TemperatureQuantity>()
            .map_err(|e| ConfigError::invalid("temperature", e.to_string()))?;

        if self.num_lambda < 2 {
            return Err(ConfigError::invalid(
                "num_lambda",
                format!("at least 2 lambda windows are required, got {}", self.num_lambda),
            ));
        }
        if let Some(values) = &self.lambda_values {
            validate_lambda_values(values)?;
            if values.len() != self.num_lambda {
                return Err(ConfigError::invalid(
                    "lambda_values",
                    format!(
                        "schedule has {} windows but num_lambda is {}",
                        values.len(),
                        self.num_lambda
                    ),
                ));
            }
        }
        Ok(())
    }
}

pub fn evenly_spaced_lambdas(num_lambda: usize) -> Vec<f64> {
    match num_lambda {
        0 => Vec::new(),
        1 => vec![0.0],
        n => (0..n).map(|i| i as f64 / (n - 1) as f64).collect(),
    }
}

fn validate_lambda_values(values: &[f64]) -> Result<(), ConfigError> {
    if values.iter().any(|v| !(0.0..=1.0).contains(v)) {
        return Err(ConfigError::invalid(
            "lambda_values",
            "all values must lie within [0, 1]",
        ));
    }
    if values.windows(2).any(|pair| pair[1] <= pair[0]) {
        return Err(ConfigError::invalid(
            "lambda_values",
            "values must be strictly increasing",
        ));
    }
    Ok(())
}

#[derive(Default)]
pub struct SimulationConfigBuilder {
    cutoff_type: Option<CutoffType>,
    cutoff: Option<String>,
    runtime: Option<String>,
    temperature: Option<String>,
    replica_exchange: Option<bool>,
    num_lambda: Option<usize>,
    lambda_values: Option<Vec<f64>>,
    output_directory: Option<PathBuf>,
    restart: Option<bool>,
}

impl SimulationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cutoff_type(mut self, cutoff_type: CutoffType) -> Self {
        self.cutoff_type = Some(cutoff_type);
        self
    }
    pub fn cutoff(mut self, cutoff: impl Into<String>) -> Self {
        self.cutoff = Some(cutoff.into());
        self
    }
    pub fn runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }
    pub fn temperature(mut self, temperature: impl Into<String>) -> Self {
        self.temperature = Some(temperature.into());
        self
    }
    pub fn replica_exchange(mut self, enabled: bool) -> Self {
        self.replica_exchange = Some(enabled);
        self
    }
    pub fn num_lambda(mut self, n: usize) -> Self {
        self.num_lambda = Some(n);
        self
    }
    pub fn lambda_values(mut self, values: Vec<f64>) -> Self {
        self.lambda_values = Some(values);
        self
    }
    pub fn output_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(path.into());
        self
    }
    pub fn restart(mut self, restart: bool) -> Self {
        self.restart = Some(restart);
        self
    }

    pub fn build(self) -> Result<SimulationConfig, ConfigError> {
        let num_lambda = match (&self.lambda_values, self.num_lambda) {
            (Some(values), None) => values.len(),
            (_, Some(n)) => n,
            (None, None) => DEFAULT_NUM_LAMBDA,
        };

        let config = SimulationConfig {
            cutoff_type: self.cutoff_type.unwrap_or(CutoffType::Pme),
            cutoff: self.cutoff.unwrap_or_else(|| DEFAULT_CUTOFF.to_string()),
            runtime: self.runtime.unwrap_or_else(|| DEFAULT_RUNTIME.to_string()),
            temperature: self
                .temperature
                .unwrap_or_else(|| DEFAULT_TEMPERATURE.to_string()),
            replica_exchange: self.replica_exchange.unwrap_or(false),
            num_lambda,
            lambda_values: self.lambda_values,
            output_directory: self
                .output_directory
                .ok_or(ConfigError::MissingParameter("output_directory"))?,
            restart: self.restart.unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }
}
