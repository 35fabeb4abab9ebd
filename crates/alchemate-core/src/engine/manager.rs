use super::context::SimulationContext;
use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use super::step::{StepCategory, WorkflowStep};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

/// A failed workflow run: the error, plus the context as it stood after the last step that
/// completed successfully.
///
/// The context is safe to hand to a new [`WorkflowManager`] to resume the run.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct WorkflowFailure {
    #[source]
    pub error: EngineError,
    pub context: Box<SimulationContext>,
}

impl WorkflowFailure {
    fn new(error: EngineError, context: SimulationContext) -> Self {
        Self {
            error,
            context: Box::new(context),
        }
    }

    pub fn into_context(self) -> SimulationContext {
        *self.context
    }
}

/// Drives an ordered list of steps against one [`SimulationContext`].
///
/// A manager lives for exactly one run: [`execute`](Self::execute) consumes it. To retry after a
/// failure, build a new manager with the context returned in the [`WorkflowFailure`]; every step
/// already recorded as completed is skipped.
pub struct WorkflowManager<'a> {
    context: SimulationContext,
    workflow_steps: Vec<Box<dyn WorkflowStep + 'a>>,
    reporter: ProgressReporter<'a>,
    checkpoint_path: Option<PathBuf>,
    strict_ordering: bool,
}

impl<'a> WorkflowManager<'a> {
    pub fn new(
        context: SimulationContext,
        workflow_steps: Vec<Box<dyn WorkflowStep + 'a>>,
    ) -> Self {
        Self {
            context,
            workflow_steps,
            reporter: ProgressReporter::new(),
            checkpoint_path: None,
            strict_ordering: false,
        }
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter<'a>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Persists the context to `path` after every step that completes.
    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    /// Rejects the step list up front when a post-processing step could only run before any
    /// base step has produced simulation data. Off by default, in which case the step's own
    /// precondition check catches the problem at execution time.
    pub fn with_strict_ordering(mut self, strict: bool) -> Self {
        self.strict_ordering = strict;
        self
    }

    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    pub fn step_identifiers(&self) -> Vec<&str> {
        self.workflow_steps.iter().map(|s| s.identifier()).collect()
    }

    /// Static pass over the step categories.
    ///
    /// Steps already recorded as completed are ignored, as is everything once simulation data
    /// is present in the context.
    pub fn validate_ordering(&self) -> Result<(), EngineError> {
        let mut base_available = self.context.simulation_data().is_some();
        for step in &self.workflow_steps {
            if self.context.has_completed(step.identifier()) {
                continue;
            }
            match step.category() {
                StepCategory::Base => base_available = true,
                StepCategory::PostProcessing if !base_available => {
                    return Err(EngineError::InvalidOrdering {
                        step: step.identifier().to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Runs every step not yet recorded as completed, in list order.
    ///
    /// Returns the final context on success. The first failing step stops the run; the returned
    /// [`WorkflowFailure`] names it and carries the context with the history of every step that
    /// did complete. Mutations a failing step made before returning its error are kept.
    #[instrument(skip_all, name = "workflow")]
    pub fn execute(self) -> Result<SimulationContext, WorkflowFailure> {
        let ordering = if self.strict_ordering {
            self.validate_ordering()
        } else {
            Ok(())
        };
        if let Err(e) = ordering {
            error!("Workflow rejected before execution: {}", e);
            return Err(WorkflowFailure::new(e, self.context));
        }

        let WorkflowManager {
            mut context,
            workflow_steps,
            reporter,
            checkpoint_path,
            ..
        } = self;

        info!(
            steps = workflow_steps.len(),
            already_completed = context.completed_steps().len(),
            "Starting workflow."
        );
        reporter.report(Progress::WorkflowStart {
            total_steps: workflow_steps.len() as u64,
        });

        let mut executed = 0usize;
        let mut skipped = 0usize;

        for step in &workflow_steps {
            let identifier = step.identifier();

            if context.has_completed(identifier) {
                debug!(step = identifier, "Step already completed; skipping.");
                reporter.report(Progress::StepSkipped {
                    name: identifier.to_string(),
                });
                skipped += 1;
                continue;
            }

            info!(step = identifier, category = %step.category(), "Running step.");
            reporter.report(Progress::StepStart {
                name: identifier.to_string(),
                category: step.category(),
            });

            if let Err(e) = step.run(&mut context, &reporter) {
                let error = EngineError::from_step(identifier, e);
                error!("{}", error);
                error!("Workflow halted.");
                reporter.report(Progress::StepFailed {
                    name: identifier.to_string(),
                });
                return Err(WorkflowFailure::new(error, context));
            }

            if let Err(e) = context.record_completion(identifier) {
                error!("{}", e);
                return Err(WorkflowFailure::new(e, context));
            }

            if let Some(Err(e)) = checkpoint_path.as_ref().map(|path| context.save(path)) {
                let error = EngineError::from(e);
                error!("{}", error);
                return Err(WorkflowFailure::new(error, context));
            }

            reporter.report(Progress::StepFinish {
                name: identifier.to_string(),
            });
            executed += 1;
        }

        reporter.report(Progress::WorkflowFinish);
        info!(executed, skipped, "Workflow finished successfully.");
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimulationConfigBuilder;
    use crate::core::system::{SimulationData, SystemHandle};
    use crate::engine::error::StepError;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    struct NamedStep {
        name: &'static str,
        category: StepCategory,
    }

    impl WorkflowStep for NamedStep {
        fn identifier(&self) -> &str {
            self.name
        }
        fn category(&self) -> StepCategory {
            self.category
        }
        fn execute(
            &self,
            context: &mut SimulationContext,
            _reporter: &ProgressReporter,
        ) -> Result<(), StepError> {
            if self.category == StepCategory::Base {
                context.set_simulation_data(SimulationData::new("output", "1ns"));
            }
            Ok(())
        }
    }

    fn step(name: &'static str, category: StepCategory) -> Box<dyn WorkflowStep> {
        Box::new(NamedStep { name, category })
    }

    fn context() -> SimulationContext {
        let config = SimulationConfigBuilder::new()
            .output_directory("output")
            .build()
            .unwrap();
        SimulationContext::new(SystemHandle::new("system.s3"), config)
    }

    #[test]
    fn validate_ordering_accepts_base_before_post() {
        let manager = WorkflowManager::new(
            context(),
            vec![
                step("Prep", StepCategory::PreProcessing),
                step("Base", StepCategory::Base),
                step("Post", StepCategory::PostProcessing),
            ],
        );
        assert!(manager.validate_ordering().is_ok());
    }

    #[test]
    fn validate_ordering_rejects_post_before_base() {
        let manager = WorkflowManager::new(
            context(),
            vec![
                step("Post", StepCategory::PostProcessing),
                step("Base", StepCategory::Base),
            ],
        );
        assert!(matches!(
            manager.validate_ordering(),
            Err(EngineError::InvalidOrdering { ref step }) if step == "Post"
        ));
    }

    #[test]
    fn validate_ordering_accepts_post_when_data_already_present() {
        let mut ctx = context();
        ctx.set_simulation_data(SimulationData::new("output", "1ns"));
        let manager = WorkflowManager::new(ctx, vec![step("Post", StepCategory::PostProcessing)]);
        assert!(manager.validate_ordering().is_ok());
    }

    #[test]
    fn strict_ordering_fails_without_running_anything() {
        let manager = WorkflowManager::new(
            context(),
            vec![
                step("Prep", StepCategory::PreProcessing),
                step("Post", StepCategory::PostProcessing),
            ],
        )
        .with_strict_ordering(true);

        let failure = manager.execute().unwrap_err();
        assert!(matches!(failure.error, EngineError::InvalidOrdering { .. }));
        assert!(failure.context.completed_steps().is_empty());
    }

    #[test]
    fn reporter_receives_step_events_in_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let reporter = ProgressReporter::with_callback(Box::new(move |p| {
            let label = match p {
                Progress::WorkflowStart { total_steps } => format!("start:{total_steps}"),
                Progress::StepStart { name, .. } => format!("run:{name}"),
                Progress::StepSkipped { name } => format!("skip:{name}"),
                Progress::StepFinish { name } => format!("done:{name}"),
                Progress::StepFailed { name } => format!("fail:{name}"),
                Progress::WorkflowFinish => "finish".to_string(),
                _ => return,
            };
            sink.lock().unwrap().push(label);
        }));

        let mut ctx = context();
        ctx.record_completion("Prep").unwrap();
        WorkflowManager::new(
            ctx,
            vec![
                step("Prep", StepCategory::PreProcessing),
                step("Base", StepCategory::Base),
            ],
        )
        .with_reporter(reporter)
        .execute()
        .unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["start:2", "skip:Prep", "run:Base", "done:Base", "finish"]
        );
    }

    #[test]
    fn checkpoint_is_written_after_each_completed_step() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.toml");

        let final_context = WorkflowManager::new(
            context(),
            vec![
                step("Prep", StepCategory::PreProcessing),
                step("Base", StepCategory::Base),
            ],
        )
        .with_checkpoint(&path)
        .execute()
        .unwrap();

        let saved = SimulationContext::load(&path).unwrap();
        assert_eq!(saved, final_context);
        assert_eq!(saved.completed_steps(), ["Prep", "Base"]);
    }

    #[test]
    fn unwritable_checkpoint_stops_the_run_after_recording_the_step() {
        let dir = tempdir().unwrap();

        let failure = WorkflowManager::new(
            context(),
            vec![
                step("Prep", StepCategory::PreProcessing),
                step("Base", StepCategory::Base),
            ],
        )
        .with_checkpoint(dir.path())
        .execute()
        .unwrap_err();

        assert!(matches!(failure.error, EngineError::Checkpoint(_)));
        assert_eq!(failure.error.step(), None);
        assert_eq!(failure.context.completed_steps(), ["Prep"]);
        assert!(failure.context.simulation_data().is_none());

        let resumed = WorkflowManager::new(
            failure.into_context(),
            vec![
                step("Prep", StepCategory::PreProcessing),
                step("Base", StepCategory::Base),
            ],
        )
        .execute()
        .unwrap();
        assert_eq!(resumed.completed_steps(), ["Prep", "Base"]);
    }

    #[test]
    fn step_identifiers_follow_list_order() {
        let manager = WorkflowManager::new(
            context(),
            vec![
                step("B", StepCategory::Base),
                step("A", StepCategory::PreProcessing),
            ],
        );
        assert_eq!(manager.step_identifiers(), vec!["B", "A"]);
    }
}
