//! describe stacks / component / sources

use strata_core::ResolveFilter;

use super::{Project, output, print_warnings};
use crate::cli::{Format, ResolveArgs};
use crate::error::{CliError, Result};

pub fn run_describe_stacks(
    project: &Project,
    stacks: Vec<String>,
    components: Vec<String>,
    sections: Vec<String>,
    args: &ResolveArgs,
    format: Format,
) -> Result<()> {
    let filter = ResolveFilter {
        stacks,
        components,
        sections,
    };
    let resolver = project.resolver(args);
    let resolved = resolver.resolve(&filter);
    print_warnings(resolver.take_warnings());
    let resolved = resolved?;

    tracing::info!(stacks = resolved.stack_names().count(), "Described stacks");
    output::print(&resolved, format)
}

pub fn run_describe_component(
    project: &Project,
    component: &str,
    stack: &str,
    args: &ResolveArgs,
    format: Format,
) -> Result<()> {
    let resolver = project.resolver(args);
    let described = resolver.describe_component(component, stack);
    print_warnings(resolver.take_warnings());
    output::print(&described?.to_mapping(), format)
}

pub fn run_describe_sources(project: &Project, component: &str, stack: &str, key: &str, format: Format) -> Result<()> {
    let (section, key) = split_key(key)?;
    let resolver = project.resolver(&ResolveArgs::default());
    let entries = resolver.sources(component, stack, section, key)?;
    if entries.is_empty() {
        return Err(CliError::user(format!(
            "'{section}.{key}' is not set for component '{component}' in stack '{stack}'"
        )));
    }
    output::print(&entries, format)
}

/// `vars.cidr` -> (`vars`, `cidr`).
fn split_key(key: &str) -> Result<(&str, &str)> {
    match key.split_once('.') {
        Some((section, rest)) if !section.is_empty() && !rest.is_empty() => Ok((section, rest)),
        _ => Err(CliError::user(format!(
            "Expected <section>.<key>, got '{key}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_key_at_first_dot() {
        assert_eq!(split_key("vars.cidr").unwrap(), ("vars", "cidr"));
        assert_eq!(split_key("settings.spacelift.enabled").unwrap(), ("settings", "spacelift.enabled"));
    }

    #[test]
    fn split_key_rejects_bare_section() {
        assert!(split_key("vars").is_err());
        assert!(split_key(".cidr").is_err());
    }
}
