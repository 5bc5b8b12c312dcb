//! Component inheritance
//!
//! A component's configuration is layered, lowest precedence first:
//! stack-wide sections, then the component type's sections
//! (`terraform.vars`), then each base component in chain order, then the
//! component's own sections. Bases come from the `component` attribute (when
//! it names another component of the stack) followed by `metadata.inherits`;
//! later-declared bases win over earlier ones.
//!
//! `metadata` is never inherited.

mod provenance;

use std::collections::BTreeSet;

use crate::component::ComponentType;
use crate::merge::{MergeOptions, merge};
use crate::value::{Mapping, Value};
use crate::{Error, Result};

pub use provenance::{DependencyType, ProvenanceEntry, trace_sources};

/// Linearized base components of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritanceChain {
    component: String,
    /// Lowest precedence first.
    bases: Vec<String>,
}

impl InheritanceChain {
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Base components, lowest precedence first.
    pub fn bases(&self) -> &[String] {
        &self.bases
    }

    /// Base components, highest precedence first.
    pub fn inheritance(&self) -> Vec<String> {
        self.bases.iter().rev().cloned().collect()
    }
}

/// Sections of a component after inheritance, before naming and functions.
#[derive(Debug, Clone, PartialEq)]
pub struct InheritedSections {
    pub vars: Mapping,
    pub env: Mapping,
    pub settings: Mapping,
    pub backend_type: Option<String>,
    pub backend: Mapping,
    pub providers: Mapping,
    pub metadata: Mapping,
    pub folder: String,
    /// Value of the `component` attribute when it differs from the name.
    pub base_component: Option<String>,
    pub chain: InheritanceChain,
}

/// Resolves components of one type in one merged stack.
pub struct InheritanceResolver<'a> {
    stack: &'a Mapping,
    component_type: ComponentType,
    options: MergeOptions,
}

impl<'a> InheritanceResolver<'a> {
    pub fn new(stack: &'a Mapping, component_type: ComponentType, options: MergeOptions) -> Self {
        Self {
            stack,
            component_type,
            options,
        }
    }

    fn components(&self) -> Option<&'a Mapping> {
        self.stack
            .get("components")
            .and_then(|c| c.get(self.component_type.as_str()))
            .and_then(Value::as_mapping)
    }

    /// Names of the components of this type, sorted.
    pub fn component_names(&self) -> Vec<String> {
        self.components()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, component: &str) -> bool {
        self.components().is_some_and(|c| c.contains_key(component))
    }

    fn definition(&self, component: &str) -> Result<Option<&'a Mapping>> {
        match self.components().and_then(|c| c.get(component)) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Mapping(m)) => Ok(Some(m)),
            Some(other) => Err(Error::MergeTypeMismatch {
                path: format!("components.{}.{component}", self.component_type),
                existing: "map",
                incoming: other.type_name(),
            }),
        }
    }

    /// Bases declared directly on a component, in declaration order.
    fn declared_bases(&self, component: &str) -> Result<Vec<String>> {
        let Some(definition) = self.definition(component)? else {
            return Ok(Vec::new());
        };
        let mut bases = Vec::new();
        if let Some(attr) = definition.get("component").and_then(Value::as_str)
            && attr != component
            && self.contains(attr)
        {
            bases.push(attr.to_string());
        }
        let inherits = definition
            .get("metadata")
            .and_then(|m| m.get("inherits"))
            .and_then(Value::as_sequence)
            .unwrap_or_default();
        for base in inherits.iter().filter_map(Value::as_str) {
            if !self.contains(base) {
                return Err(Error::BaseComponentNotFound {
                    component: component.to_string(),
                    base: base.to_string(),
                    component_type: self.component_type.to_string(),
                });
            }
            bases.push(base.to_string());
        }
        Ok(bases)
    }

    /// Linearize the inheritance graph depth-first.
    ///
    /// A base's own bases precede it, and a base reached twice keeps its
    /// first position.
    pub fn chain(&self, component: &str) -> Result<InheritanceChain> {
        let mut path = vec![component.to_string()];
        let mut bases = Vec::new();
        self.visit(component, &mut path, &mut bases)?;
        Ok(InheritanceChain {
            component: component.to_string(),
            bases,
        })
    }

    fn visit(&self, component: &str, path: &mut Vec<String>, order: &mut Vec<String>) -> Result<()> {
        for base in self.declared_bases(component)? {
            if let Some(start) = path.iter().position(|p| *p == base) {
                let mut cycle = path[start..].to_vec();
                cycle.push(base);
                return Err(Error::InheritanceCycle {
                    component: path[0].clone(),
                    cycle,
                });
            }
            path.push(base.clone());
            self.visit(&base, path, order)?;
            path.pop();
            if !order.contains(&base) {
                order.push(base);
            }
        }
        Ok(())
    }

    fn section_of(value: Option<&'a Value>, path: impl FnOnce() -> String) -> Result<Option<&'a Mapping>> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Mapping(m)) => Ok(Some(m)),
            Some(other) => Err(Error::MergeTypeMismatch {
                path: path(),
                existing: "map",
                incoming: other.type_name(),
            }),
        }
    }

    /// Each level's copy of `section`, lowest precedence first.
    fn levels(&self, section: &str, chain: &InheritanceChain) -> Result<Vec<&'a Mapping>> {
        let kind = self.component_type.as_str();
        let mut levels = Vec::new();
        levels.extend(Self::section_of(self.stack.get(section), || section.to_string())?);
        levels.extend(Self::section_of(
            self.stack.get(kind).and_then(|t| t.get(section)),
            || format!("{kind}.{section}"),
        )?);
        for name in chain.bases().iter().map(String::as_str).chain([chain.component()]) {
            let definition = self.definition(name)?;
            levels.extend(Self::section_of(
                definition.and_then(|d| d.get(section)),
                || format!("components.{kind}.{name}.{section}"),
            )?);
        }
        Ok(levels)
    }

    /// First scalar found for `key`, searching highest precedence first.
    fn scalar(&self, key: &str, chain: &InheritanceChain) -> Result<Option<String>> {
        let kind = self.component_type.as_str();
        let mut candidates = vec![self.definition(chain.component())?.and_then(|d| d.get(key))];
        for base in chain.bases().iter().rev() {
            candidates.push(self.definition(base)?.and_then(|d| d.get(key)));
        }
        candidates.push(self.stack.get(kind).and_then(|t| t.get(key)));
        candidates.push(self.stack.get(key));
        Ok(candidates
            .into_iter()
            .flatten()
            .find(|v| !v.is_null())
            .and_then(Value::scalar_string))
    }

    /// Folder holding the component's code.
    fn folder(&self, component: &str, seen: &mut BTreeSet<String>) -> Result<String> {
        seen.insert(component.to_string());
        let definition = self.definition(component)?;
        let metadata_component = definition
            .and_then(|d| d.get("metadata"))
            .and_then(|m| m.get("component"))
            .and_then(Value::as_str);
        if let Some(folder) = metadata_component {
            return Ok(folder.to_string());
        }
        match definition.and_then(|d| d.get("component")).and_then(Value::as_str) {
            Some(attr) if attr != component && self.contains(attr) && !seen.contains(attr) => {
                self.folder(attr, seen)
            }
            Some(attr) => Ok(attr.to_string()),
            None => Ok(component.to_string()),
        }
    }

    /// Apply the inheritance rules to one component.
    pub fn resolve(&self, component: &str) -> Result<InheritedSections> {
        if !self.contains(component) {
            return Err(Error::BaseComponentNotFound {
                component: component.to_string(),
                base: component.to_string(),
                component_type: self.component_type.to_string(),
            });
        }
        let chain = self.chain(component)?;

        let section = |name: &str| -> Result<Mapping> { merge(self.levels(name, &chain)?, self.options) };
        let vars = section("vars")?;
        let env = section("env")?;
        let settings = section("settings")?;
        let backend_all = section("backend")?;
        let providers = section("providers")?;

        let backend_type = self.scalar("backend_type", &chain)?;
        let backend = match backend_type {
            Some(ref kind) => backend_all
                .get(kind)
                .and_then(Value::as_mapping)
                .cloned()
                .unwrap_or_default(),
            None => backend_all,
        };

        let definition = self.definition(component)?;
        let metadata = Self::section_of(definition.and_then(|d| d.get("metadata")), || {
            format!("components.{}.{component}.metadata", self.component_type)
        })?
        .cloned()
        .unwrap_or_default();
        let base_component = definition
            .and_then(|d| d.get("component"))
            .and_then(Value::as_str)
            .filter(|attr| *attr != component)
            .map(str::to_string);

        Ok(InheritedSections {
            vars,
            env,
            settings,
            backend_type,
            backend,
            providers,
            metadata,
            folder: self.folder(component, &mut BTreeSet::new())?,
            base_component,
            chain,
        })
    }
}
