//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// converge - Reconcile declared state against a running system
#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Plan the actions that would turn one state document into another
    ///
    /// Nothing is executed.
    ///
    /// Examples:
    ///   converge diff old.yaml new.yaml rules.yaml
    ///   converge diff old.yaml new.yaml rules.yaml --explain
    ///   converge diff old.yaml new.yaml rules.yaml --json
    Diff {
        /// Current state document (YAML or JSON)
        old: PathBuf,

        /// Desired state document (YAML or JSON)
        new: PathBuf,

        /// Rule document
        rules: PathBuf,

        /// Also print the raw changes and the unit each action becomes
        #[arg(long)]
        explain: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Reconcile a system towards a desired state document
    ///
    /// Runs one controller until it comes to rest, or until interrupted
    /// when polling is enabled.
    Run {
        /// Desired state document (YAML or JSON)
        desired: PathBuf,

        /// Rule document
        rules: PathBuf,

        /// State the system is currently known to be in (default: empty)
        #[arg(long)]
        current: Option<PathBuf>,

        /// Configuration file (default: ./converge.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Name of the managed instance, used in logs and reports
        #[arg(long, default_value = "default")]
        instance: String,

        /// Keep polling for drift until interrupted
        #[arg(long)]
        watch: bool,

        /// Output the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a rule document and list its rules
    Rules {
        /// Rule document
        rules: PathBuf,
    },
}
