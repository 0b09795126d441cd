//! CLI module for Strata.
//!
//! This module provides the command-line interface: argument parsing and
//! rendering of plans, walk results, and state.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, RunArgs, StateCommands};
pub use output::{OutputFormatter, PlanSource};
