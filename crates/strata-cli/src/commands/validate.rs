//! validate stacks

use colored::Colorize;

use super::{Project, print_warnings};
use crate::cli::ResolveArgs;
use crate::error::Result;

pub fn run_validate_stacks(project: &Project) -> Result<()> {
    let resolver = project.resolver(&ResolveArgs::default());
    let report = resolver.validate_stacks();
    print_warnings(resolver.take_warnings());
    let report = report?;

    println!(
        "{} {} manifest(s), {} component(s)",
        "Valid:".green().bold(),
        report.manifests,
        report.components
    );
    Ok(())
}
