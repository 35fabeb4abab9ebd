use crate::core::io::matrix::{EXCHANGE_MATRIX_FILE, read_exchange_matrix};
use crate::engine::backend::{SimulationBackend, run_with_restarts};
use crate::engine::context::SimulationContext;
use crate::engine::error::StepError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::step::{StepCategory, WorkflowStep};
use nalgebra::DMatrix;
use std::sync::Arc;
use tracing::{info, warn};

const LAMBDA_OPTIMIZATION_DIR: &str = "lambda_optimization";

/// Checks the inputs and lays out the output directory before anything is simulated.
///
/// When the configuration carries no explicit lambda values, the evenly spaced schedule is
/// written into it so later steps see the exact windows being simulated.
#[derive(Debug, Default)]
pub struct PrepareSystem;

impl PrepareSystem {
    pub fn new() -> Self {
        Self
    }
}

impl WorkflowStep for PrepareSystem {
    fn identifier(&self) -> &str {
        "PrepareSystem"
    }

    fn category(&self) -> StepCategory {
        StepCategory::PreProcessing
    }

    fn execute(
        &self,
        context: &mut SimulationContext,
        _reporter: &ProgressReporter,
    ) -> Result<(), StepError> {
        let system = context.system().path();
        if !context.system().exists() {
            return Err(StepError::precondition(format!(
                "system file '{}' does not exist",
                system.display()
            )));
        }
        info!(system = %system.display(), "Preparing system.");

        context.config().validate()?;
        std::fs::create_dir_all(&context.config().output_directory)?;

        let config = context.config_mut();
        if config.lambda_values.is_none() {
            let schedule = config.lambda_schedule();
            info!(windows = schedule.len(), "Using evenly spaced lambda schedule.");
            config.lambda_values = Some(schedule);
        }
        Ok(())
    }
}

/// Refines the lambda schedule using short replica-exchange runs.
///
/// Each round simulates the current schedule for `runtime`, reads the exchange matrix and
/// inserts a window halfway between every neighbouring pair whose exchange probability is
/// below `threshold`. The search stops at the first round that inserts nothing.
pub struct OptimizeLambdaSchedule {
    backend: Arc<dyn SimulationBackend>,
    threshold: f64,
    attempts: usize,
    runtime: String,
    max_restarts: usize,
}

impl OptimizeLambdaSchedule {
    pub fn new(backend: Arc<dyn SimulationBackend>) -> Self {
        Self {
            backend,
            threshold: 0.15,
            attempts: 3,
            runtime: "100ps".to_string(),
            max_restarts: 1,
        }
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = max_restarts;
        self
    }
}

impl WorkflowStep for OptimizeLambdaSchedule {
    fn identifier(&self) -> &str {
        "OptimizeLambdaSchedule"
    }

    fn category(&self) -> StepCategory {
        StepCategory::PreProcessing
    }

    fn execute(
        &self,
        context: &mut SimulationContext,
        reporter: &ProgressReporter,
    ) -> Result<(), StepError> {
        let system = context.system().clone();
        let mut schedule = context.config().lambda_schedule();
        let optimization_dir = context
            .config()
            .output_directory
            .join(LAMBDA_OPTIMIZATION_DIR);

        reporter.report(Progress::TaskStart {
            total_steps: self.attempts as u64,
        });

        for round in 1..=self.attempts {
            let mut trial = context.config().clone();
            trial.output_directory = optimization_dir.join(format!("round_{round}"));
            trial.runtime = self.runtime.clone();
            trial.replica_exchange = true;
            trial.restart = false;
            trial.num_lambda = schedule.len();
            trial.lambda_values = Some(schedule.clone());
            trial.validate()?;

            info!(round, windows = schedule.len(), "Running lambda optimization round.");
            run_with_restarts(self.backend.as_ref(), &system, &mut trial, self.max_restarts)?;

            let matrix = read_exchange_matrix(&trial.output_directory.join(EXCHANGE_MATRIX_FILE))?;
            let refined = refine_lambda_schedule(&schedule, &matrix, self.threshold)?;
            reporter.report(Progress::TaskIncrement);

            if refined.len() == schedule.len() {
                info!(round, "Exchange probabilities above threshold; schedule is final.");
                break;
            }
            info!(
                round,
                inserted = refined.len() - schedule.len(),
                "Inserted lambda windows."
            );
            if round == self.attempts {
                warn!(
                    "Lambda optimization used all {} round(s); final schedule not re-checked.",
                    self.attempts
                );
            }
            schedule = refined;
        }

        reporter.report(Progress::TaskFinish);

        let config = context.config_mut();
        config.num_lambda = schedule.len();
        config.lambda_values = Some(schedule);
        Ok(())
    }
}

/// Inserts a midpoint window between every neighbouring pair of `lambdas` whose exchange
/// probability in `matrix` falls below `threshold`.
///
/// `matrix` must be square with one row per window.
pub fn refine_lambda_schedule(
    lambdas: &[f64],
    matrix: &DMatrix<f64>,
    threshold: f64,
) -> Result<Vec<f64>, StepError> {
    if matrix.nrows() != lambdas.len() || matrix.ncols() != lambdas.len() {
        return Err(StepError::Failed(format!(
            "exchange matrix is {}x{} but the schedule has {} windows",
            matrix.nrows(),
            matrix.ncols(),
            lambdas.len()
        )));
    }

    let mut refined = Vec::with_capacity(lambdas.len() * 2);
    for (i, pair) in lambdas.windows(2).enumerate() {
        refined.push(pair[0]);
        if matrix[(i, i + 1)] < threshold {
            refined.push((pair[0] + pair[1]) / 2.0);
        }
    }
    refined.extend(lambdas.last());
    Ok(refined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{SimulationConfig, SimulationConfigBuilder};
    use crate::core::system::SystemHandle;
    use crate::engine::backend::BackendError;
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn low_probability_matrix() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            4,
            4,
            &[
                1.00, 0.00, 0.00, 0.00, //
                0.00, 0.75, 0.25, 0.00, //
                0.00, 0.25, 0.65, 0.10, //
                0.00, 0.00, 0.10, 0.90,
            ],
        )
    }

    fn high_probability_matrix(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| if i.abs_diff(j) <= 1 { 0.25 } else { 0.0 })
    }

    fn approx_eq(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 0.01, "{actual:?} vs {expected:?}");
        }
    }

    fn write_matrix(path: &Path, matrix: &DMatrix<f64>) {
        let rows: Vec<String> = matrix
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|v| format!("{v:.18e}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        fs::write(path, rows.join("\n")).unwrap();
    }

    /// Writes a low-probability matrix for a four-window schedule and a well-mixed one
    /// otherwise, recording the schedule of every launch.
    struct RepexBackend {
        schedules: RefCell<Vec<Vec<f64>>>,
    }

    impl SimulationBackend for RepexBackend {
        fn name(&self) -> &str {
            "repex"
        }

        fn run(&self, _: &SystemHandle, config: &SimulationConfig) -> Result<(), BackendError> {
            assert!(config.replica_exchange);
            let schedule = config.lambda_schedule();
            let matrix = if schedule.len() == 4 {
                low_probability_matrix()
            } else {
                high_probability_matrix(schedule.len())
            };
            fs::create_dir_all(&config.output_directory).unwrap();
            write_matrix(&config.output_directory.join(EXCHANGE_MATRIX_FILE), &matrix);
            self.schedules.borrow_mut().push(schedule);
            Ok(())
        }
    }

    fn context_in(dir: &Path, num_lambda: usize) -> SimulationContext {
        let config = SimulationConfigBuilder::new()
            .runtime("1ns")
            .num_lambda(num_lambda)
            .output_directory(dir.join("output"))
            .build()
            .unwrap();
        SimulationContext::new(SystemHandle::new(dir.join("merged.s3")), config)
    }

    #[test]
    fn refine_inserts_midpoints_below_threshold() {
        let refined = refine_lambda_schedule(
            &[0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0],
            &low_probability_matrix(),
            0.15,
        )
        .unwrap();

        approx_eq(&refined, &[0.0, 0.167, 0.333, 0.667, 0.833, 1.0]);
    }

    #[test]
    fn refine_keeps_well_mixed_schedule() {
        let refined = refine_lambda_schedule(
            &[0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0],
            &high_probability_matrix(4),
            0.15,
        )
        .unwrap();

        approx_eq(&refined, &[0.0, 0.333, 0.666, 1.0]);
    }

    #[test]
    fn refine_rejects_mismatched_matrix() {
        let result = refine_lambda_schedule(&[0.0, 0.5, 1.0], &high_probability_matrix(4), 0.15);
        assert!(matches!(result, Err(StepError::Failed(_))));
    }

    #[test]
    fn prepare_system_fails_when_system_file_is_missing() {
        let dir = tempdir().unwrap();
        let mut ctx = context_in(dir.path(), 4);

        let result = PrepareSystem::new().run(&mut ctx, &ProgressReporter::new());

        assert!(matches!(result, Err(StepError::Precondition { .. })));
        assert!(!dir.path().join("output").exists());
    }

    #[test]
    fn prepare_system_creates_output_and_fixes_schedule() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("merged.s3"), b"system").unwrap();
        let mut ctx = context_in(dir.path(), 3);

        PrepareSystem::new()
            .run(&mut ctx, &ProgressReporter::new())
            .unwrap();

        assert!(dir.path().join("output").is_dir());
        assert_eq!(ctx.config().lambda_values, Some(vec![0.0, 0.5, 1.0]));
    }

    #[test]
    fn optimization_stops_once_no_window_is_inserted() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(RepexBackend {
            schedules: RefCell::new(Vec::new()),
        });
        let step = OptimizeLambdaSchedule::new(backend.clone()).attempts(5);
        let mut ctx = context_in(dir.path(), 4);

        step.run(&mut ctx, &ProgressReporter::new()).unwrap();

        assert_eq!(backend.schedules.borrow().len(), 2);
        assert_eq!(ctx.config().num_lambda, 6);
        approx_eq(
            &ctx.config().lambda_schedule(),
            &[0.0, 0.167, 0.333, 0.667, 0.833, 1.0],
        );
        assert_eq!(ctx.config().runtime, "1ns");
        assert!(
            dir.path()
                .join("output/lambda_optimization/round_1")
                .join(EXCHANGE_MATRIX_FILE)
                .exists()
        );
        assert!(ctx.config().validate().is_ok());
    }

    #[test]
    fn optimization_respects_attempt_limit() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(RepexBackend {
            schedules: RefCell::new(Vec::new()),
        });
        let step = OptimizeLambdaSchedule::new(backend.clone()).attempts(1);
        let mut ctx = context_in(dir.path(), 4);

        step.run(&mut ctx, &ProgressReporter::new()).unwrap();

        assert_eq!(backend.schedules.borrow().len(), 1);
        assert_eq!(ctx.config().num_lambda, 6);
    }

    #[test]
    fn missing_exchange_matrix_fails_the_step() {
        struct SilentBackend;
        impl SimulationBackend for SilentBackend {
            fn name(&self) -> &str {
                "silent"
            }
            fn run(&self, _: &SystemHandle, _: &SimulationConfig) -> Result<(), BackendError> {
                Ok(())
            }
        }

        let dir = tempdir().unwrap();
        let step = OptimizeLambdaSchedule::new(Arc::new(SilentBackend));
        let mut ctx = context_in(dir.path(), 4);
        let before = ctx.config().clone();

        let result = step.run(&mut ctx, &ProgressReporter::new());

        assert!(matches!(result, Err(StepError::Read(_))));
        assert_eq!(*ctx.config(), before);
    }
}
