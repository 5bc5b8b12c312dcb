//! describe affected

use strata_core::AffectedDetector;
use strata_git::GitRevisions;

use super::{Project, output, resolve_options};
use crate::cli::{Format, ResolveArgs};
use crate::error::Result;

pub fn run_describe_affected(
    project: &Project,
    base: &str,
    target: Option<&str>,
    exclude_dependents: bool,
    args: &ResolveArgs,
    format: Format,
) -> Result<()> {
    let revisions = GitRevisions::open(&project.config.base_path)?;
    let mut entries = AffectedDetector::new(&project.config, &revisions, project.collaborators.clone())
        .with_options(resolve_options(args))
        .detect(base, target)?;

    if exclude_dependents {
        entries.retain(|entry| !entry.included_as_dependent);
    }

    tracing::info!(
        base,
        target = target.unwrap_or("working tree"),
        affected = entries.len(),
        "Detected affected components"
    );
    output::print(&entries, format)
}
