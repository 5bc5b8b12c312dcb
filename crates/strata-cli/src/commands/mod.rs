//! Command implementations for strata-cli

mod affected;
mod describe;
mod output;
mod validate;

use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use strata_core::{
    Cancellation, Collaborators, ConfigLoader, ConfigOverrides, ResolveOptions, Resolver, StrataConfig,
};

use crate::cli::{Cli, ResolveArgs};
use crate::error::Result;

pub use affected::run_describe_affected;
pub use describe::{run_describe_component, run_describe_sources, run_describe_stacks};
pub use validate::run_validate_stacks;

/// Configuration and collaborators shared by every command.
pub struct Project {
    pub config: StrataConfig,
    pub collaborators: Collaborators,
}

impl Project {
    pub fn load(cwd: &Path, cli: &Cli) -> Result<Self> {
        let overrides = ConfigOverrides {
            base_path: cli.base_path.clone(),
            name_pattern: cli.name_pattern.clone(),
            list_merge_strategy: cli.list_merge_strategy.clone(),
            ..Default::default()
        };
        let config = ConfigLoader::new(cwd).with_overrides(overrides).load()?;
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self {
            config,
            collaborators,
        })
    }

    pub fn resolver(&self, args: &ResolveArgs) -> Resolver {
        Resolver::new(self.config.clone(), self.collaborators.clone()).with_options(resolve_options(args))
    }
}

pub fn resolve_options(args: &ResolveArgs) -> ResolveOptions {
    let cancellation = match args.timeout {
        Some(secs) => Cancellation::with_timeout(Duration::from_secs(secs)),
        None => Cancellation::new(),
    };
    ResolveOptions {
        ignore_missing_imports: args.ignore_missing_imports,
        lenient_functions: args.lenient,
        process_functions: !args.skip_functions,
        cancellation,
    }
}

/// Print warnings collected during resolution to stderr.
fn print_warnings(warnings: Vec<String>) {
    for warning in warnings {
        eprintln!("{}: {}", "warning".yellow().bold(), warning);
    }
}
