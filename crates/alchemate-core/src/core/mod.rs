//! # Core Module
//!
//! Stateless building blocks shared by the engine and the concrete workflow steps.
//!
//! - **Configuration** ([`config`]) - The simulation configuration passed through to backends.
//! - **System** ([`system`]) - The input system handle and the data a base step produces.
//! - **Units** ([`units`]) - Parsing and arithmetic for quantity strings such as `"500ps"`.
//! - **I/O** ([`io`]) - Readers for replica-exchange matrices and convergence tables.

pub mod config;
pub mod io;
pub mod system;
pub mod units;
