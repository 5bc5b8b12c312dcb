//! Strata CLI
//!
//! Resolves stack manifests and prints the result as YAML or JSON.

mod cli;
mod commands;
mod error;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, DescribeTarget, ValidateTarget};
use commands::Project;
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = std::env::current_dir()?;
    let project = Project::load(&cwd, &cli)?;

    match cli.command {
        Commands::Describe { target } => cmd_describe(&project, target),
        Commands::Validate {
            target: ValidateTarget::Stacks,
        } => commands::run_validate_stacks(&project),
    }
}

/// `RUST_LOG` drives the filter; `--verbose` forces debug.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
    tracing::debug!("Verbose mode enabled");
}

fn cmd_describe(project: &Project, target: DescribeTarget) -> Result<()> {
    match target {
        DescribeTarget::Stacks {
            stacks,
            components,
            sections,
            resolve,
            output,
        } => commands::run_describe_stacks(project, stacks, components, sections, &resolve, output.format),
        DescribeTarget::Component {
            component,
            stack,
            resolve,
            output,
        } => commands::run_describe_component(project, &component, &stack, &resolve, output.format),
        DescribeTarget::Sources {
            component,
            stack,
            key,
            output,
        } => commands::run_describe_sources(project, &component, &stack, &key, output.format),
        DescribeTarget::Affected {
            base,
            target,
            exclude_dependents,
            resolve,
            output,
        } => commands::run_describe_affected(
            project,
            &base,
            target.as_deref(),
            exclude_dependents,
            &resolve,
            output.format,
        ),
    }
}
