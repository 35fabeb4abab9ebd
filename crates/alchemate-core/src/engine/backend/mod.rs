//! The seam between workflow steps and the external simulation engine.
//!
//! Backends are opaque to the engine: a step hands one the system handle and the current
//! configuration, and the backend leaves its outputs (replica-exchange matrix, convergence
//! table, trajectories) in the configured output directory.

mod command;

pub use command::{BACKEND_CONFIG_FILE, CommandBackend};

use crate::core::config::SimulationConfig;
use crate::core::system::SystemHandle;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to launch backend program '{program}': {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },

    #[error("Backend process exited with {status}: {stderr}")]
    Process { status: String, stderr: String },

    #[error("Failed to prepare backend input: {0}")]
    Input(String),

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Simulation failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: usize,
        last: Box<BackendError>,
    },
}

pub trait SimulationBackend {
    fn name(&self) -> &str;

    fn run(&self, system: &SystemHandle, config: &SimulationConfig) -> Result<(), BackendError>;
}

/// Runs `backend`, restarting it up to `max_restarts` times after a failure.
///
/// The first attempt uses `config` as given. Every failed attempt switches `config.restart`
/// on so the next launch continues from the backend's own checkpoint files. Returns the
/// number of launches it took to succeed.
pub fn run_with_restarts(
    backend: &dyn SimulationBackend,
    system: &SystemHandle,
    config: &mut SimulationConfig,
    max_restarts: usize,
) -> Result<usize, BackendError> {
    let max_attempts = max_restarts + 1;
    let mut attempt = 0;
    loop {
        attempt += 1;
        info!(
            backend = backend.name(),
            attempt,
            max_attempts,
            restart = config.restart,
            "Launching simulation backend."
        );
        match backend.run(system, config) {
            Ok(()) => return Ok(attempt),
            Err(e) if attempt < max_attempts => {
                warn!(
                    "Backend '{}' failed on attempt {}/{}: {}. Restarting.",
                    backend.name(),
                    attempt,
                    max_attempts,
                    e
                );
                config.restart = true;
            }
            Err(e) => {
                return Err(BackendError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
        }
    }
}
