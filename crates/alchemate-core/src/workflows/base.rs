use crate::core::system::SimulationData;
use crate::engine::backend::{SimulationBackend, run_with_restarts};
use crate::engine::context::SimulationContext;
use crate::engine::error::StepError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::step::{StepCategory, WorkflowStep};
use std::sync::Arc;
use tracing::info;

const DEFAULT_MAX_RESTARTS: usize = 3;

/// Runs the production simulation and establishes the simulation data.
///
/// Not idempotent: running it again relaunches the backend and replaces the stored data.
pub struct RunSimulation {
    backend: Arc<dyn SimulationBackend>,
    max_restarts: usize,
}

impl RunSimulation {
    pub fn new(backend: Arc<dyn SimulationBackend>) -> Self {
        Self {
            backend,
            max_restarts: DEFAULT_MAX_RESTARTS,
        }
    }

    pub fn max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = max_restarts;
        self
    }
}

impl WorkflowStep for RunSimulation {
    fn identifier(&self) -> &str {
        "RunSimulation"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Base
    }

    fn execute(
        &self,
        context: &mut SimulationContext,
        reporter: &ProgressReporter,
    ) -> Result<(), StepError> {
        context.config().validate()?;
        let system = context.system().clone();

        reporter.report(Progress::Message(format!(
            "Running {} with runtime {}",
            self.backend.name(),
            context.config().runtime
        )));
        let attempts = run_with_restarts(
            self.backend.as_ref(),
            &system,
            context.config_mut(),
            self.max_restarts,
        )?;

        let config = context.config();
        let mut data = SimulationData::new(config.output_directory.clone(), config.runtime.clone());
        data.lambda_values = config.lambda_schedule();
        data.attempts = attempts;

        info!(
            attempts,
            windows = data.lambda_values.len(),
            "Simulation finished; simulation data stored in context."
        );
        context.set_simulation_data(data);
        Ok(())
    }
}
