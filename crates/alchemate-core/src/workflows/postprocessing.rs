use crate::core::io::convergence::{
    CONVERGENCE_TABLE_FILE, forward_std_over_tail, read_convergence_table,
};
use crate::core::units::TimeQuantity;
use crate::engine::backend::{SimulationBackend, run_with_restarts};
use crate::engine::context::SimulationContext;
use crate::engine::error::StepError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::step::{StepCategory, WorkflowStep};
use crate::engine::transaction;
use std::sync::Arc;
use tracing::{info, warn};

/// Only the second half of the data enters the convergence estimate.
const TAIL_FRACTION: f64 = 0.5;
const DATA_REQUIREMENT: &str = "convergence analysis needs simulation output";

/// Extends the production run until the free energy estimate settles.
///
/// Convergence is judged on the sample standard deviation of the forward estimate over the
/// last half of the data. Below `threshold` (kT/mol) the data is marked converged; otherwise
/// the runtime grows by `extension` and the backend continues from its checkpoint, at most
/// `attempts` times.
pub struct OptimizeConvergence {
    backend: Arc<dyn SimulationBackend>,
    attempts: usize,
    threshold: f64,
    extension: String,
    max_restarts: usize,
}

impl OptimizeConvergence {
    pub fn new(backend: Arc<dyn SimulationBackend>) -> Self {
        Self {
            backend,
            attempts: 3,
            threshold: 0.25,
            extension: "500ps".to_string(),
            max_restarts: 1,
        }
    }

    pub fn attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    fn estimate(&self, context: &mut SimulationContext) -> Result<f64, StepError> {
        let data = context.require_simulation_data_mut(DATA_REQUIREMENT)?;
        let path = data.output_directory.join(CONVERGENCE_TABLE_FILE);
        let points = read_convergence_table(&path)?;
        let std = forward_std_over_tail(&points, TAIL_FRACTION).ok_or_else(|| {
            StepError::Failed(format!(
                "'{}' has fewer than two points with data_fraction >= {}",
                path.display(),
                TAIL_FRACTION
            ))
        })?;
        data.free_energy_std = Some(std);
        info!("Free energy standard deviation: {:.4} kT/mol", std);
        Ok(std)
    }

    fn extend(&self, context: &mut SimulationContext) -> Result<(), StepError> {
        let extension: TimeQuantity = self.extension.parse()?;
        let old_runtime = context.config().runtime.clone();
        let new_runtime = (context.config().runtime_quantity()? + extension).to_string();
        info!("Extending runtime from {} to {}", old_runtime, new_runtime);

        let system = context.system().clone();
        let config = context.config_mut();
        config.runtime = new_runtime.clone();
        config.restart = true;
        let attempts =
            run_with_restarts(self.backend.as_ref(), &system, config, self.max_restarts)?;

        let data = context.require_simulation_data_mut(DATA_REQUIREMENT)?;
        data.runtime = new_runtime;
        data.attempts += attempts;
        data.converged = None;
        Ok(())
    }
}

impl WorkflowStep for OptimizeConvergence {
    fn identifier(&self) -> &str {
        "OptimizeConvergence"
    }

    fn category(&self) -> StepCategory {
        StepCategory::PostProcessing
    }

    fn execute(
        &self,
        context: &mut SimulationContext,
        reporter: &ProgressReporter,
    ) -> Result<(), StepError> {
        reporter.report(Progress::TaskStart {
            total_steps: self.attempts as u64,
        });

        let mut extensions = 0;
        let converged = loop {
            let std = self.estimate(context)?;
            if std < self.threshold {
                info!("Simulation converged!");
                break true;
            }
            if extensions == self.attempts {
                warn!(
                    "Not converged after {} extension(s): {:.4} kT/mol > threshold {}.",
                    extensions, std, self.threshold
                );
                break false;
            }
            extensions += 1;
            transaction::atomic(context, |ctx| self.extend(ctx))?;
            reporter.report(Progress::TaskIncrement);
        };

        reporter.report(Progress::TaskFinish);
        context
            .require_simulation_data_mut("convergence analysis needs simulation output")?
            .converged = Some(converged);
        Ok(())
    }
}
