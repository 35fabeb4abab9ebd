use super::context::SimulationContext;
use super::error::StepError;
use super::progress::ProgressReporter;
use std::fmt;

/// Where a step sits in a pipeline, which fixes what it may assume about the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepCategory {
    /// Runs before any simulation data exists and must not depend on it.
    PreProcessing,
    /// Establishes the simulation data; tolerates data left by an earlier base step.
    Base,
    /// Consumes the simulation data and fails fast without it.
    PostProcessing,
}

impl StepCategory {
    pub fn requires_simulation_data(self) -> bool {
        matches!(self, StepCategory::PostProcessing)
    }
}

impl fmt::Display for StepCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepCategory::PreProcessing => write!(f, "pre-processing"),
            StepCategory::Base => write!(f, "base"),
            StepCategory::PostProcessing => write!(f, "post-processing"),
        }
    }
}

/// One unit of pipeline work.
///
/// Implementors provide [`identifier`](Self::identifier), [`category`](Self::category) and
/// [`execute`](Self::execute); the manager only ever calls [`run`](Self::run), which applies
/// the category preconditions uniformly before delegating to `execute`.
///
/// The identifier is the key recorded in
/// [`SimulationContext::completed_steps`](SimulationContext::completed_steps) and must stay
/// stable across process restarts, so derive it from the step type, never from instance state.
///
/// The framework does not make steps idempotent or transactional. A step that mutates the
/// context and then fails leaves those mutations in place unless it wraps them in
/// [`transaction::atomic`](super::transaction::atomic).
pub trait WorkflowStep {
    fn identifier(&self) -> &str;

    fn category(&self) -> StepCategory;

    /// Checks that the context satisfies what this step needs before any work starts.
    ///
    /// The default enforces the category contract. Overrides should call
    /// [`check_category_preconditions`] before adding their own checks.
    fn check_preconditions(&self, context: &SimulationContext) -> Result<(), StepError> {
        check_category_preconditions(self.identifier(), self.category(), context)
    }

    fn execute(
        &self,
        context: &mut SimulationContext,
        reporter: &ProgressReporter,
    ) -> Result<(), StepError>;

    fn run(
        &self,
        context: &mut SimulationContext,
        reporter: &ProgressReporter,
    ) -> Result<(), StepError> {
        self.check_preconditions(context)?;
        self.execute(context, reporter)
    }
}

pub fn check_category_preconditions(
    identifier: &str,
    category: StepCategory,
    context: &SimulationContext,
) -> Result<(), StepError> {
    if category.requires_simulation_data() && context.simulation_data().is_none() {
        return Err(StepError::precondition(format!(
            "{} step '{}' requires simulation data, but no base step has produced any",
            category, identifier
        )));
    }
    Ok(())
}
