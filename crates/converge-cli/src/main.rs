//! converge CLI
//!
//! Plans and runs reconciliation of declared state documents.

mod cli;
mod commands;
mod error;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error::Result;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr; stdout carries command output
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,converge=debug"
    } else {
        "warn,converge=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute a command, returning the process exit code
fn run(command: Commands) -> Result<i32> {
    match command {
        Commands::Diff {
            old,
            new,
            rules,
            explain,
            json,
        } => commands::run_diff(&old, &new, &rules, explain, json),
        Commands::Run {
            desired,
            rules,
            current,
            config,
            instance,
            watch,
            json,
        } => {
            let options = commands::RunOptions {
                desired,
                rules,
                current,
                config,
                instance,
                watch,
                json,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(commands::run_reconcile(options))
        }
        Commands::Rules { rules } => commands::run_rules(&rules),
    }
}
