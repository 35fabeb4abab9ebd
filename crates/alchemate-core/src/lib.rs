//! # alchemate Core Library
//!
//! A small, resumable workflow engine for multi-stage alchemical free-energy simulation
//! pipelines. A workflow is an ordered list of steps that run one after another against a
//! single mutable [`engine::context::SimulationContext`], which records every completed step
//! so that an interrupted workflow can be picked up where it stopped.
//!
//! ## Architectural Philosophy
//!
//! The library follows the same three-layer split used throughout the crate:
//!
//! - **[`core`]: The Foundation.** Plain data models handed to the simulation engine
//!   (`SimulationConfig`, `SystemHandle`, `SimulationData`), physical-unit parsing, and readers
//!   for the output files a simulation backend produces.
//!
//! - **[`engine`]: The Logic Core.** The stateful layer that drives a workflow: the
//!   `SimulationContext`, the `WorkflowStep` contract, the `WorkflowManager` execution loop,
//!   progress reporting, transactional helpers and the `SimulationBackend` seam to the external
//!   simulation engine.
//!
//! - **[`workflows`]: The Public API.** Concrete pre-processing, base and post-processing steps
//!   that users assemble into pipelines.

pub mod core;
pub mod engine;
pub mod workflows;
