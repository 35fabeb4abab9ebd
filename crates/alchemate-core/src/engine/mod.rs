//! # Engine Module
//!
//! This module implements the workflow engine: the machinery that drives an ordered list of
//! simulation steps against one shared [`context::SimulationContext`].
//!
//! ## Overview
//!
//! A workflow run is strictly sequential. The [`manager::WorkflowManager`] walks its step list
//! in order, skips every step whose identifier the context already records as completed, runs
//! the rest, and records each success before moving on. The first failure stops the run and
//! hands the context back to the caller untouched by any later step, ready for a resumed run.
//!
//! ## Architecture
//!
//! - **Context** ([`context`]) - Simulation inputs, accumulated outputs and completion history
//! - **Steps** ([`step`]) - The `WorkflowStep` contract and step categories
//! - **Manager** ([`manager`]) - Execution loop, resume logic, checkpointing
//! - **Backends** ([`backend`]) - The seam to the external simulation engine
//! - **Transactions** ([`transaction`]) - All-or-nothing context mutations for step authors
//! - **Progress Monitoring** ([`progress`]) - Progress reporting and user feedback mechanisms
//! - **Error Handling** ([`error`]) - Step and engine error types

pub mod backend;
pub mod context;
pub mod error;
pub mod manager;
pub mod progress;
pub mod step;
pub mod transaction;
