//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Strata - plan and apply declarative infrastructure.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments shared by commands that evaluate a configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to the state file (defaults to `.strata/state.json` in the
    /// configuration directory).
    #[arg(long, env = "STRATA_STATE")]
    pub state: Option<PathBuf>,

    /// Set a root variable, as `name=value`. May be repeated.
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Number of nodes to visit at once.
    #[arg(long, default_value_t = crate::walk::DEFAULT_PARALLELISM)]
    pub parallelism: usize,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the changes needed to converge on the configuration.
    Plan {
        /// Configuration directory.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Plan to destroy everything in state.
        #[arg(long)]
        destroy: bool,

        /// Read recorded objects back before planning.
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        refresh: bool,

        /// Only update state from reality; plan no changes.
        #[arg(long, conflicts_with = "destroy")]
        refresh_only: bool,

        /// Save the plan to this file, for an exact apply.
        #[arg(long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Apply a saved plan, or plan and apply a configuration.
    Apply {
        /// Configuration directory or saved plan file.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Configuration directory a saved plan was made from.
        #[arg(long, default_value = ".")]
        config_dir: PathBuf,

        /// Skip confirmation prompt.
        #[arg(long)]
        auto_approve: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Destroy everything in state.
    Destroy {
        /// Configuration directory.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Skip confirmation prompt.
        #[arg(long)]
        auto_approve: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Update state from reality.
    Refresh {
        /// Configuration directory.
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Validate the configuration and its dependency graph.
    Validate {
        /// Configuration directory.
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Render a saved plan.
    Show {
        /// Plan file.
        planfile: PathBuf,
    },

    /// Print the dependency graph in DOT format.
    Graph {
        /// Configuration directory.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Graph the destroy walk instead of the plan walk.
        #[arg(long)]
        destroy: bool,

        /// Path to the state file.
        #[arg(long, env = "STRATA_STATE")]
        state: Option<PathBuf>,
    },

    /// Inspect and edit state.
    State {
        /// Configuration directory.
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Path to the state file.
        #[arg(long, env = "STRATA_STATE")]
        state: Option<PathBuf>,

        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// List recorded instances.
    List,

    /// Show one recorded instance.
    Show {
        /// Instance address, e.g. `null_resource.a[0]`.
        address: String,
    },

    /// Forget an instance without destroying it.
    Rm {
        /// Instance address.
        address: String,
    },

    /// Remove a stale lock.
    Unlock {
        /// Remove the lock whoever holds it.
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_plan_flags() {
        let cli = Cli::try_parse_from([
            "strata", "plan", "infra", "--refresh=false", "--out", "p.json", "--var", "a=1", "--var", "b=2",
        ])
        .unwrap();
        let Commands::Plan {
            path,
            refresh,
            out,
            run,
            destroy,
            ..
        } = cli.command
        else {
            panic!("expected plan");
        };
        assert_eq!(path, PathBuf::from("infra"));
        assert!(!refresh);
        assert!(!destroy);
        assert_eq!(out, Some(PathBuf::from("p.json")));
        assert_eq!(run.vars, vec!["a=1", "b=2"]);
        assert_eq!(run.parallelism, 10);
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["strata", "state", "list", "--output", "json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::State {
                command: StateCommands::List,
                ..
            }
        ));
    }
}
