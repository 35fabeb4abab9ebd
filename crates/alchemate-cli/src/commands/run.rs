use crate::cli::RunArgs;
use crate::commands::status::render_status;
use crate::config::{AppConfig, PartialWorkflowConfig, StepSpec};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use alchemate::{
    core::config::SimulationConfig,
    engine::{
        backend::{CommandBackend, SimulationBackend},
        context::SimulationContext,
        manager::WorkflowManager,
        progress::ProgressReporter,
        step::WorkflowStep,
    },
    workflows::{
        base::RunSimulation,
        postprocessing::OptimizeConvergence,
        preprocessing::{OptimizeLambdaSchedule, PrepareSystem},
    },
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub fn run(args: RunArgs) -> Result<()> {
    let partial_config = PartialWorkflowConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let app_config = partial_config.merge_with_cli(&args)?;

    let new_context =
        SimulationContext::new(app_config.system.clone(), app_config.simulation.clone());
    let checkpoint = args
        .checkpoint
        .clone()
        .unwrap_or_else(|| new_context.default_checkpoint_path());
    let context = resume_or(new_context, &checkpoint, args.fresh)?;
    let steps = build_steps(&app_config)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting workflow with {} step(s)...", steps.len());
    let outcome = WorkflowManager::new(context, steps)
        .with_reporter(reporter)
        .with_checkpoint(&checkpoint)
        .with_strict_ordering(args.strict_ordering)
        .execute();

    match outcome {
        Ok(context) => {
            print!("{}", render_status(&context));
            println!("Workflow context saved to: {}", checkpoint.display());
            Ok(())
        }
        Err(failure) => {
            eprintln!(
                "Workflow stopped after {} completed step(s). Rerun the same command to resume from {}.",
                failure.context.completed_steps().len(),
                checkpoint.display()
            );
            Err(failure.into())
        }
    }
}

/// Loads the checkpoint at `checkpoint` when one exists, otherwise starts from `new_context`.
///
/// With `fresh`, an existing checkpoint is moved aside to `<checkpoint>.bak` so a later run
/// cannot resume from it.
fn resume_or(
    new_context: SimulationContext,
    checkpoint: &Path,
    fresh: bool,
) -> Result<SimulationContext> {
    if fresh && checkpoint.is_file() {
        let mut backup = checkpoint.as_os_str().to_owned();
        backup.push(".bak");
        std::fs::rename(checkpoint, &backup)?;
        info!("Moved previous checkpoint to {:?}", backup);
    }
    if fresh || !checkpoint.is_file() {
        info!("Starting a new workflow context.");
        return Ok(new_context);
    }

    info!("Resuming workflow from checkpoint {:?}", checkpoint);
    let context = SimulationContext::load(checkpoint)?;
    if context.system() != new_context.system() {
        warn!(
            "Checkpoint was created for system '{}' but '{}' was requested; continuing with the checkpoint.",
            context.system().path().display(),
            new_context.system().path().display()
        );
    }
    let ignored = config_differences(context.config(), new_context.config());
    if !ignored.is_empty() {
        warn!(
            "Checkpoint keeps its own values for: {}. Rerun with --fresh to apply the workflow settings.",
            ignored.join(", ")
        );
    }
    println!(
        "Resuming workflow: {} step(s) already completed.",
        context.completed_steps().len()
    );
    Ok(context)
}

/// Names the settings where the checkpointed config disagrees with the requested one.
///
/// `restart` is owned by the backends and never compared. The lambda schedule is compared as
/// resolved, so a schedule pinned by `PrepareSystem` matches the `num-lambda` it came from.
fn config_differences(saved: &SimulationConfig, requested: &SimulationConfig) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if saved.cutoff_type != requested.cutoff_type {
        fields.push("cutoff-type");
    }
    if saved.cutoff != requested.cutoff {
        fields.push("cutoff");
    }
    if saved.runtime != requested.runtime {
        fields.push("runtime");
    }
    if saved.temperature != requested.temperature {
        fields.push("temperature");
    }
    if saved.replica_exchange != requested.replica_exchange {
        fields.push("replica-exchange");
    }
    if saved.lambda_schedule() != requested.lambda_schedule() {
        fields.push("lambda schedule");
    }
    if saved.output_directory != requested.output_directory {
        fields.push("output-directory");
    }
    fields
}

/// Instantiates the configured steps in file order, sharing a single backend between them.
pub fn build_steps(config: &AppConfig) -> Result<Vec<Box<dyn WorkflowStep>>> {
    let backend: Option<Arc<dyn SimulationBackend>> = match &config.backend_command {
        Some(argv) => Some(Arc::new(CommandBackend::new(argv.clone())?)),
        None => None,
    };
    let require_backend = || {
        backend.clone().ok_or_else(|| {
            CliError::Config("`backend.command` is required for simulation steps.".to_string())
        })
    };

    config
        .workflow
        .iter()
        .map(|spec| -> Result<Box<dyn WorkflowStep>> {
            let step: Box<dyn WorkflowStep> = match spec {
                StepSpec::PrepareSystem => Box::new(PrepareSystem::new()),
                StepSpec::OptimizeLambdaSchedule {
                    threshold,
                    attempts,
                    runtime,
                } => {
                    let mut step = OptimizeLambdaSchedule::new(require_backend()?)
                        .max_restarts(config.max_restarts);
                    if let Some(threshold) = threshold {
                        step = step.threshold(*threshold);
                    }
                    if let Some(attempts) = attempts {
                        step = step.attempts(*attempts);
                    }
                    if let Some(runtime) = runtime {
                        step = step.runtime(runtime.clone());
                    }
                    Box::new(step)
                }
                StepSpec::RunSimulation => Box::new(
                    RunSimulation::new(require_backend()?).max_restarts(config.max_restarts),
                ),
                StepSpec::OptimizeConvergence {
                    threshold,
                    attempts,
                    extension,
                } => {
                    let mut step = OptimizeConvergence::new(require_backend()?)
                        .max_restarts(config.max_restarts);
                    if let Some(threshold) = threshold {
                        step = step.threshold(*threshold);
                    }
                    if let Some(attempts) = attempts {
                        step = step.attempts(*attempts);
                    }
                    if let Some(extension) = extension {
                        step = step.extension(extension.clone());
                    }
                    Box::new(step)
                }
            };
            Ok(step)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use alchemate::core::config::{SimulationConfigBuilder, evenly_spaced_lambdas};
    use alchemate::engine::context::CHECKPOINT_FILE;
    use clap::Parser;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    fn write_workflow(dir: &TempDir, backend: &str) -> PathBuf {
        fs::write(dir.path().join("merged.s3"), "system").unwrap();
        let content = format!(
            r#"
system = '{system}'

[simulation]
runtime = "10ps"
num-lambda = 3
output-directory = '{output}'

[backend]
command = {backend}
max-restarts = 0

[[workflow]]
type = "prepare-system"

[[workflow]]
type = "run-simulation"
"#,
            system = dir.path().join("merged.s3").display(),
            output = dir.path().join("output").display(),
        );
        let path = dir.path().join("workflow.toml");
        fs::write(&path, content).unwrap();
        path
    }

    fn run_args(workflow: &Path, extra: &[&str]) -> RunArgs {
        let workflow = workflow.to_string_lossy().to_string();
        let mut argv = vec!["alchemate", "run", "-c", workflow.as_str()];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            _ => panic!("Expected 'run' subcommand"),
        }
    }

    fn saved_steps(dir: &TempDir) -> Vec<String> {
        SimulationContext::load(&dir.path().join("output").join(CHECKPOINT_FILE))
            .unwrap()
            .completed_steps()
            .to_vec()
    }

    #[test]
    fn build_steps_follows_workflow_order() {
        let dir = tempdir().unwrap();
        let workflow = write_workflow(&dir, r#"["true"]"#);
        let config = PartialWorkflowConfig::from_file(&workflow)
            .unwrap()
            .merge_with_cli(&run_args(&workflow, &[]))
            .unwrap();

        let steps = build_steps(&config).unwrap();
        let ids: Vec<&str> = steps.iter().map(|s| s.identifier()).collect();
        assert_eq!(ids, ["PrepareSystem", "RunSimulation"]);
    }

    #[cfg(unix)]
    #[test]
    fn completed_run_writes_checkpoint_and_resumes_as_no_op() {
        let dir = tempdir().unwrap();
        let workflow = write_workflow(&dir, r#"["true"]"#);

        run(run_args(&workflow, &[])).unwrap();
        assert_eq!(saved_steps(&dir), ["PrepareSystem", "RunSimulation"]);

        run(run_args(&workflow, &[])).unwrap();
        assert_eq!(saved_steps(&dir), ["PrepareSystem", "RunSimulation"]);
    }

    #[cfg(unix)]
    #[test]
    fn failed_run_resumes_from_last_completed_step() {
        let dir = tempdir().unwrap();
        let workflow = write_workflow(&dir, r#"["false"]"#);

        let result = run(run_args(&workflow, &[]));
        assert!(matches!(result, Err(CliError::Workflow(_))));
        assert_eq!(saved_steps(&dir), ["PrepareSystem"]);

        let workflow = write_workflow(&dir, r#"["true"]"#);
        run(run_args(&workflow, &[])).unwrap();
        assert_eq!(saved_steps(&dir), ["PrepareSystem", "RunSimulation"]);
    }

    #[cfg(unix)]
    #[test]
    fn resumed_run_keeps_checkpointed_settings() {
        let dir = tempdir().unwrap();
        let workflow = write_workflow(&dir, r#"["false"]"#);
        let _ = run(run_args(&workflow, &[]));

        let workflow = write_workflow(&dir, r#"["true"]"#);
        run(run_args(&workflow, &["-S", "simulation.runtime=2ns"])).unwrap();

        let saved =
            SimulationContext::load(&dir.path().join("output").join(CHECKPOINT_FILE)).unwrap();
        assert_eq!(saved.completed_steps(), ["PrepareSystem", "RunSimulation"]);
        assert_eq!(saved.config().runtime, "10ps");
        assert_eq!(saved.simulation_data().unwrap().runtime, "10ps");
    }

    #[test]
    fn config_differences_names_changed_settings_only() {
        let saved = SimulationConfigBuilder::new()
            .runtime("10ps")
            .num_lambda(3)
            .output_directory("output")
            .build()
            .unwrap();

        let mut pinned = saved.clone();
        pinned.lambda_values = Some(evenly_spaced_lambdas(3));
        pinned.restart = true;
        assert!(config_differences(&pinned, &saved).is_empty());

        let mut requested = saved.clone();
        requested.runtime = "2ns".to_string();
        requested.num_lambda = 5;
        assert_eq!(config_differences(&saved, &requested), ["runtime", "lambda schedule"]);
    }

    #[cfg(unix)]
    #[test]
    fn fresh_flag_moves_previous_checkpoint_aside() {
        let dir = tempdir().unwrap();
        let workflow = write_workflow(&dir, r#"["false"]"#);
        let _ = run(run_args(&workflow, &[]));
        let checkpoint = dir.path().join("output").join(CHECKPOINT_FILE);
        assert!(checkpoint.is_file());

        let missing = dir.path().join("missing.s3");
        let missing = missing.to_string_lossy().to_string();
        let result = run(run_args(&workflow, &["--fresh", "-i", missing.as_str()]));

        assert!(matches!(result, Err(CliError::Workflow(_))));
        assert!(!checkpoint.exists());
        let backup = dir.path().join("output").join(format!("{}.bak", CHECKPOINT_FILE));
        let previous = SimulationContext::load(&backup).unwrap();
        assert_eq!(previous.completed_steps(), ["PrepareSystem"]);
    }

    #[cfg(unix)]
    #[test]
    fn fresh_flag_ignores_existing_checkpoint() {
        let dir = tempdir().unwrap();
        let workflow = write_workflow(&dir, r#"["false"]"#);
        let _ = run(run_args(&workflow, &[]));
        assert_eq!(saved_steps(&dir), ["PrepareSystem"]);

        let result = run(run_args(&workflow, &["--fresh"]));

        match result {
            Err(CliError::Workflow(failure)) => {
                assert_eq!(failure.error.step(), Some("RunSimulation"));
                assert_eq!(failure.context.completed_steps(), ["PrepareSystem"]);
            }
            other => panic!("expected a workflow failure, got {:?}", other),
        }
    }
}
