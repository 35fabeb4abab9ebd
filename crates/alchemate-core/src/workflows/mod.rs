//! # Workflows Module
//!
//! Concrete steps that users assemble into simulation pipelines.
//!
//! ## Overview
//!
//! Every step implements [`WorkflowStep`](crate::engine::step::WorkflowStep) and belongs to one
//! category, which determines what it may assume about the context:
//!
//! - **Pre-processing** ([`preprocessing`]) - System preparation and lambda-schedule
//!   optimization ahead of the production run.
//! - **Base** ([`base`]) - The production simulation that establishes the simulation data.
//! - **Post-processing** ([`postprocessing`]) - Convergence analysis and runtime extension on
//!   top of the production output.
//!
//! A typical pipeline:
//!
//! ```no_run
//! use alchemate::core::config::SimulationConfigBuilder;
//! use alchemate::core::system::SystemHandle;
//! use alchemate::engine::backend::CommandBackend;
//! use alchemate::engine::context::SimulationContext;
//! use alchemate::engine::manager::WorkflowManager;
//! use alchemate::workflows::{base::RunSimulation, postprocessing::OptimizeConvergence};
//! use alchemate::workflows::preprocessing::PrepareSystem;
//! use std::sync::Arc;
//!
//! let config = SimulationConfigBuilder::new()
//!     .runtime("100ps")
//!     .replica_exchange(true)
//!     .output_directory("output")
//!     .build()?;
//! let context = SimulationContext::new(SystemHandle::new("merged_molecule.s3"), config);
//! let backend = Arc::new(CommandBackend::new(vec!["somd2".into(), "{system}".into()])?);
//!
//! let final_context = WorkflowManager::new(
//!     context,
//!     vec![
//!         Box::new(PrepareSystem::new()),
//!         Box::new(RunSimulation::new(backend.clone())),
//!         Box::new(OptimizeConvergence::new(backend).threshold(0.1)),
//!     ],
//! )
//! .execute()?;
//! println!("Completed: {:?}", final_context.completed_steps());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod base;
pub mod postprocessing;
pub mod preprocessing;
