use alchemate::engine::progress::{Progress, ProgressCallback};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

struct Bars {
    workflow: ProgressBar,
    task: ProgressBar,
}

/// Renders workflow progress as two bars: one over the steps, one over the current step's
/// inner rounds (optimization attempts, runtime extensions).
#[derive(Clone)]
pub struct CliProgressHandler {
    bars: Arc<Mutex<Bars>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let workflow = multi.add(ProgressBar::new(0).with_style(Self::workflow_style()));
        let task = multi.add(ProgressBar::new(0).with_style(Self::task_style()));
        workflow.finish_and_clear();
        task.finish_and_clear();

        Self {
            bars: Arc::new(Mutex::new(Bars { workflow, task })),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let bars = self.bars.clone();

        Box::new(move |progress: Progress| {
            let Ok(bars) = bars.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };
            let Bars { workflow, task } = &*bars;

            match progress {
                Progress::WorkflowStart { total_steps } => {
                    workflow.reset();
                    workflow.set_length(total_steps);
                    workflow.set_position(0);
                    workflow.set_message("Starting workflow");
                    workflow.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                }
                Progress::StepStart { name, category } => {
                    workflow.set_message(format!("{} ({})", name, category));
                }
                Progress::StepSkipped { name } => {
                    workflow.println(format!("  ↷ {} already completed, skipping", name));
                    workflow.inc(1);
                }
                Progress::StepFinish { name } => {
                    workflow.println(format!("  ✓ {}", name));
                    workflow.inc(1);
                }
                Progress::StepFailed { name } => {
                    task.finish_and_clear();
                    workflow.disable_steady_tick();
                    workflow.abandon_with_message(format!("✗ {} failed", name));
                }
                Progress::WorkflowFinish => {
                    workflow.disable_steady_tick();
                    workflow.finish_with_message("✓ Done");
                }
                Progress::TaskStart { total_steps } => {
                    task.reset();
                    task.set_length(total_steps);
                    task.set_position(0);
                }
                Progress::TaskIncrement => {
                    task.inc(1);
                }
                Progress::TaskFinish => {
                    task.finish_and_clear();
                }
                Progress::Message(msg) => {
                    workflow.println(format!("  {}", msg));
                }
            }
        })
    }

    fn workflow_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .expect("Failed to create workflow style template")
            .progress_chars("##-")
    }

    fn task_style() -> ProgressStyle {
        ProgressStyle::with_template("    [{bar:30.yellow/blue}] round {pos}/{len}")
            .expect("Failed to create task style template")
            .progress_chars("=>-")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}
