use super::context::SimulationContext;
use tracing::debug;

/// Runs `action` against `context` with all-or-nothing semantics.
///
/// The context is snapshotted before the action runs. If the action fails, every mutation it
/// made is discarded by restoring the snapshot before the error is returned; on success the
/// mutations are kept.
pub fn atomic<F, R, E>(context: &mut SimulationContext, action: F) -> Result<R, E>
where
    F: FnOnce(&mut SimulationContext) -> Result<R, E>,
{
    // 1. Record the original state.
    let snapshot = context.clone();

    // 2. Execute the action.
    match action(context) {
        Ok(result) => Ok(result),
        Err(e) => {
            // 3. Revert to the recorded state.
            debug!("Transaction failed; restoring the workflow context snapshot.");
            *context = snapshot;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimulationConfigBuilder;
    use crate::core::system::SystemHandle;

    fn context() -> SimulationContext {
        let config = SimulationConfigBuilder::new()
            .runtime("100ps")
            .output_directory("output")
            .build()
            .unwrap();
        SimulationContext::new(SystemHandle::new("system.s3"), config)
    }

    #[test]
    fn successful_action_keeps_mutations() {
        let mut ctx = context();
        let result: Result<u32, String> = atomic(&mut ctx, |c| {
            c.config_mut().runtime = "600ps".to_string();
            Ok(7)
        });

        assert_eq!(result, Ok(7));
        assert_eq!(ctx.config().runtime, "600ps");
    }

    #[test]
    fn failed_action_restores_snapshot() {
        let mut ctx = context();
        let before = ctx.clone();

        let result: Result<(), String> = atomic(&mut ctx, |c| {
            c.config_mut().runtime = "600ps".to_string();
            c.config_mut().restart = true;
            Err("backend crashed".to_string())
        });

        assert_eq!(result, Err("backend crashed".to_string()));
        assert_eq!(ctx, before);
    }
}
