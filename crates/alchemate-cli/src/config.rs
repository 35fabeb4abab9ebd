use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use alchemate::core::config::{CutoffType, SimulationConfig, SimulationConfigBuilder};
use alchemate::core::system::SystemHandle;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const DEFAULT_MAX_RESTARTS: usize = 3;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSimulationConfig {
    cutoff_type: Option<String>,
    cutoff: Option<String>,
    runtime: Option<String>,
    temperature: Option<String>,
    replica_exchange: Option<bool>,
    num_lambda: Option<usize>,
    lambda_values: Option<Vec<f64>>,
    output_directory: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialBackendConfig {
    command: Option<Vec<String>>,
    max_restarts: Option<usize>,
}

/// One `[[workflow]]` entry, selected by its `type` key.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "kebab-case",
    deny_unknown_fields
)]
pub enum StepSpec {
    PrepareSystem,
    OptimizeLambdaSchedule {
        threshold: Option<f64>,
        attempts: Option<usize>,
        runtime: Option<String>,
    },
    RunSimulation,
    OptimizeConvergence {
        threshold: Option<f64>,
        attempts: Option<usize>,
        extension: Option<String>,
    },
}

impl StepSpec {
    pub fn needs_backend(&self) -> bool {
        !matches!(self, StepSpec::PrepareSystem)
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialWorkflowConfig {
    system: Option<PathBuf>,
    simulation: Option<PartialSimulationConfig>,
    backend: Option<PartialBackendConfig>,
    #[serde(default)]
    workflow: Vec<StepSpec>,
}

/// Everything `alchemate run` needs, after the workflow file, CLI flags and defaults are merged.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub system: SystemHandle,
    pub simulation: SimulationConfig,
    pub backend_command: Option<Vec<String>>,
    pub max_restarts: usize,
    pub workflow: Vec<StepSpec>,
}

impl PartialWorkflowConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading workflow from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<AppConfig> {
        self.apply_set_values(&args.set_values)?;

        let system = args.input.clone().or(self.system).ok_or_else(|| {
            CliError::Config(
                "A system file is required either as `system` in the workflow file or via --input."
                    .to_string(),
            )
        })?;

        let sim = self.simulation.unwrap_or_default();
        let output_directory = args
            .output
            .clone()
            .or(sim.output_directory)
            .ok_or_else(|| {
                CliError::Config(
                    "`simulation.output-directory` is required either in the workflow file or via --output."
                        .to_string(),
                )
            })?;

        let mut builder = SimulationConfigBuilder::new().output_directory(output_directory);
        if let Some(cutoff_type) = sim.cutoff_type {
            builder = builder.cutoff_type(CutoffType::from_str(&cutoff_type)?);
        }
        if let Some(cutoff) = sim.cutoff {
            builder = builder.cutoff(cutoff);
        }
        if let Some(runtime) = sim.runtime {
            builder = builder.runtime(runtime);
        }
        if let Some(temperature) = sim.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(replica_exchange) = sim.replica_exchange {
            builder = builder.replica_exchange(replica_exchange);
        }
        if let Some(num_lambda) = sim.num_lambda {
            builder = builder.num_lambda(num_lambda);
        }
        if let Some(lambda_values) = sim.lambda_values {
            builder = builder.lambda_values(lambda_values);
        }
        let simulation = builder.build()?;

        if self.workflow.is_empty() {
            return Err(CliError::Config(
                "The workflow file must define at least one [[workflow]] step.".to_string(),
            ));
        }

        let backend = self.backend.unwrap_or_default();
        if backend.command.is_none() && self.workflow.iter().any(StepSpec::needs_backend) {
            return Err(CliError::Config(
                "`backend.command` is required when the workflow runs simulations.".to_string(),
            ));
        }

        Ok(AppConfig {
            system: SystemHandle::new(system),
            simulation,
            backend_command: backend.command,
            max_restarts: backend.max_restarts.unwrap_or(DEFAULT_MAX_RESTARTS),
            workflow: self.workflow,
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            let invalid = |kind: &str| {
                CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value_str))
            };
            match key {
                "system" => self.system = Some(PathBuf::from(value_str)),
                "simulation.cutoff-type" => {
                    self.simulation.get_or_insert_with(Default::default).cutoff_type =
                        Some(value_str.to_string());
                }
                "simulation.cutoff" => {
                    self.simulation.get_or_insert_with(Default::default).cutoff =
                        Some(value_str.to_string());
                }
                "simulation.runtime" => {
                    self.simulation.get_or_insert_with(Default::default).runtime =
                        Some(value_str.to_string());
                }
                "simulation.temperature" => {
                    self.simulation.get_or_insert_with(Default::default).temperature =
                        Some(value_str.to_string());
                }
                "simulation.replica-exchange" => {
                    self.simulation.get_or_insert_with(Default::default).replica_exchange =
                        Some(value_str.parse().map_err(|_| invalid("boolean"))?);
                }
                "simulation.num-lambda" => {
                    self.simulation.get_or_insert_with(Default::default).num_lambda =
                        Some(value_str.parse().map_err(|_| invalid("integer"))?);
                }
                "simulation.output-directory" => {
                    self.simulation.get_or_insert_with(Default::default).output_directory =
                        Some(PathBuf::from(value_str));
                }
                "backend.max-restarts" => {
                    self.backend
                        .get_or_insert_with(Default::default)
                        .max_restarts = Some(value_str.parse().map_err(|_| invalid("integer"))?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}
