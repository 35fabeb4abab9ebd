use crate::cli::StatusArgs;
use crate::error::{CliError, Result};
use alchemate::engine::context::SimulationContext;
use tracing::info;

pub fn run(args: StatusArgs) -> Result<()> {
    if !args.checkpoint.is_file() {
        return Err(CliError::Argument(format!(
            "No workflow context found at '{}'",
            args.checkpoint.display()
        )));
    }

    info!("Loading workflow context from {:?}", &args.checkpoint);
    let context = SimulationContext::load(&args.checkpoint)?;
    print!("{}", render_status(&context));
    Ok(())
}

/// Human-readable summary of a workflow context.
pub fn render_status(context: &SimulationContext) -> String {
    let mut lines = vec![
        format!("System:           {}", context.system().path().display()),
        format!(
            "Output directory: {}",
            context.config().output_directory.display()
        ),
        format!("Runtime:          {}", context.config().runtime),
        format!("Lambda windows:   {}", context.config().lambda_schedule().len()),
    ];

    if context.completed_steps().is_empty() {
        lines.push("Completed steps:  none".to_string());
    } else {
        lines.push("Completed steps:".to_string());
        lines.extend(
            context
                .completed_steps()
                .iter()
                .enumerate()
                .map(|(i, step)| format!("  {}. {}", i + 1, step)),
        );
    }

    match context.simulation_data() {
        None => lines.push("Simulation data:  none".to_string()),
        Some(data) => {
            let convergence = match (data.converged, data.free_energy_std) {
                (Some(true), Some(std)) => format!("converged ({:.4} kT/mol)", std),
                (Some(false), Some(std)) => format!("not converged ({:.4} kT/mol)", std),
                _ => "not analysed".to_string(),
            };
            lines.push(format!(
                "Simulation data:  {} in {} attempt(s), {}",
                data.runtime, data.attempts, convergence
            ));
        }
    }

    lines.join("\n") + "\n"
}
