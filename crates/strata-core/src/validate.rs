//! Validate-all mode
//!
//! Unlike [`Resolver::resolve`], validation keeps going after a manifest
//! fails and reports every failure at once.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::component::{ComponentConfig, ComponentType};
use crate::error::ValidationFailure;
use crate::functions::FunctionCall;
use crate::resolve::Resolver;
use crate::value::{Mapping, Value};
use crate::{Error, Result};

/// Summary of a successful validation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub manifests: usize,
    pub components: usize,
}

impl Resolver {
    /// Expand, merge and resolve every located manifest without evaluating
    /// functions, collecting failures per manifest.
    ///
    /// Function calls are checked for syntax only. A component defined
    /// differently by two manifests for the same stack is a failure.
    pub fn validate_stacks(&self) -> Result<ValidationReport> {
        let located = match self.locator().locate(None) {
            Ok(located) => located,
            Err(e) => {
                return Err(Error::Validation {
                    failures: vec![ValidationFailure {
                        manifest: self.config().stacks.base_path.clone(),
                        message: e.to_string(),
                    }],
                });
            }
        };

        let mut failures = Vec::new();
        let mut report = ValidationReport::default();
        let mut seen: BTreeMap<(String, ComponentType, String), (String, Mapping)> = BTreeMap::new();

        for file in &located.files {
            report.manifests += 1;
            let components = self
                .process_manifest(file)
                .and_then(|manifest| self.components_of(&manifest));
            let components = match components {
                Ok(components) => components,
                Err(e) => {
                    tracing::debug!(manifest = %file.relative(), error = %e, "Manifest failed validation");
                    failures.push(ValidationFailure {
                        manifest: file.relative().to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for component in components {
                report.components += 1;
                if let Err(e) = check_function_syntax(&component) {
                    failures.push(ValidationFailure {
                        manifest: file.relative().to_string(),
                        message: format!("component '{}': {e}", component.name),
                    });
                }
                let key = (
                    component.stack.clone(),
                    component.component_type,
                    component.name.clone(),
                );
                let comparable = component.comparable();
                match seen.get(&key) {
                    Some((first, existing)) if *existing != comparable => {
                        failures.push(ValidationFailure {
                            manifest: file.relative().to_string(),
                            message: format!(
                                "component '{}' in stack '{}' is defined differently in '{first}'",
                                component.name, component.stack
                            ),
                        });
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(key, (file.relative().to_string(), comparable));
                    }
                }
            }
        }

        if failures.is_empty() {
            tracing::info!(manifests = report.manifests, components = report.components, "All manifests valid");
            Ok(report)
        } else {
            Err(Error::Validation { failures })
        }
    }
}

fn check_function_syntax(component: &ComponentConfig) -> Result<()> {
    fn walk(value: &Value) -> Result<()> {
        match value {
            Value::String(raw) => FunctionCall::parse(raw).map(|_| ()),
            Value::Sequence(items) => items.iter().try_for_each(walk),
            Value::Mapping(map) => map.values().try_for_each(walk),
            _ => Ok(()),
        }
    }
    component
        .to_mapping()
        .values()
        .try_for_each(walk)
}
