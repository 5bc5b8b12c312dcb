//! Affected-component detection
//!
//! Both revisions are resolved independently, each into its own scratch
//! tree with its own resolver and caches. Components whose resolved
//! configuration differs are affected, as are components that depend on
//! them through `settings.depends_on`. The result lists dependencies before
//! their dependents.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::{Serialize, Serializer};
use strata_fs::NormalizedPath;
use strata_git::RevisionProvider;

use crate::component::{ComponentConfig, ComponentType};
use crate::config::StrataConfig;
use crate::functions::Collaborators;
use crate::resolve::{ResolveFilter, ResolveOptions, Resolver};
use crate::value::Value;
use crate::{Error, Result};

/// Why a component is in the affected list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    /// Only present in the target revision.
    Added,
    /// Only present in the base revision.
    Removed,
    /// The first resolved section that differs.
    Section(String),
    /// A file in the component's folder changed.
    Component,
    /// A file listed in `settings.depends_on` changed.
    File,
    /// A folder listed in `settings.depends_on` has changes.
    Folder,
    /// Depends on an affected component.
    Dependent,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeReason::Added => f.write_str("added"),
            ChangeReason::Removed => f.write_str("removed"),
            ChangeReason::Section(section) => write!(f, "stack.{section}"),
            ChangeReason::Component => f.write_str("component"),
            ChangeReason::File => f.write_str("file"),
            ChangeReason::Folder => f.write_str("folder"),
            ChangeReason::Dependent => f.write_str("dependent"),
        }
    }
}

impl Serialize for ChangeReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One affected component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffectedEntry {
    pub component: String,
    pub component_type: ComponentType,
    pub stack: String,
    pub reason: ChangeReason,
    pub included_as_dependent: bool,
}

type ComponentKey = (String, ComponentType, String);

fn key_of(component: &ComponentConfig) -> ComponentKey {
    (
        component.stack.clone(),
        component.component_type,
        component.name.clone(),
    )
}

fn display_key((stack, _, name): &ComponentKey) -> String {
    format!("{stack}/{name}")
}

/// A `settings.depends_on` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Dependency {
    component: Option<String>,
    stack: Option<String>,
    file: Option<String>,
    folder: Option<String>,
}

impl Dependency {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(component) => Some(Dependency {
                component: Some(component.clone()),
                ..Default::default()
            }),
            Value::Mapping(map) => {
                let field = |name: &str| map.get(name).and_then(Value::as_str).map(str::to_string);
                Some(Dependency {
                    component: field("component"),
                    stack: field("stack"),
                    file: field("file"),
                    folder: field("folder"),
                })
            }
            _ => None,
        }
    }
}

/// Entries of `settings.depends_on`, which is either a list or a map whose
/// keys are ignored.
fn dependencies(component: &ComponentConfig) -> Vec<Dependency> {
    match component.settings.get("depends_on") {
        Some(Value::Sequence(items)) => items.iter().filter_map(Dependency::from_value).collect(),
        Some(Value::Mapping(map)) => map.values().filter_map(Dependency::from_value).collect(),
        _ => Vec::new(),
    }
}

/// Compares the resolved configuration of two revisions.
pub struct AffectedDetector<'a> {
    config: StrataConfig,
    revisions: &'a dyn RevisionProvider,
    collaborators: Collaborators,
    options: ResolveOptions,
}

impl<'a> AffectedDetector<'a> {
    pub fn new(config: &StrataConfig, revisions: &'a dyn RevisionProvider, collaborators: Collaborators) -> Self {
        Self {
            config: config.clone(),
            revisions,
            collaborators,
            options: ResolveOptions::default(),
        }
    }

    /// Options applied to the resolution of both revisions.
    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Components affected between `base` and `target`, dependencies first.
    ///
    /// Without a target the working tree is compared against `base`.
    pub fn detect(&self, base: &str, target: Option<&str>) -> Result<Vec<AffectedEntry>> {
        let root = canonical(self.revisions.root());
        let mut working = self.config.clone();
        working.base_path = canonical(&working.base()).to_native();

        let base_dir = tempfile::tempdir()?;
        self.materialize(base, base_dir.path())?;
        let base_config = working.rebase(&root.to_native(), base_dir.path())?;

        let target_dir = match target {
            Some(revision) => {
                let dir = tempfile::tempdir()?;
                self.materialize(revision, dir.path())?;
                Some(dir)
            }
            None => None,
        };
        let target_config = match &target_dir {
            Some(dir) => working.rebase(&root.to_native(), dir.path())?,
            None => working.clone(),
        };

        let changed_files = self
            .revisions
            .changed_files(base, target)
            .map_err(|source| Error::AffectedDetection {
                revision: target.unwrap_or(base).to_string(),
                source,
            })?;
        tracing::debug!(files = changed_files.len(), "Changed files between revisions");

        let before = self.resolve_side(base_config)?;
        let after = self.resolve_side(target_config)?;

        let changes = Changes {
            files: &changed_files,
            repo_base: working.base().strip_prefix(&root).map(str::to_string),
            config: &working,
        };
        let mut affected: BTreeMap<ComponentKey, ChangeReason> = BTreeMap::new();

        for (key, component) in &after {
            if !reportable(component) {
                continue;
            }
            let reason = match before.get(key) {
                None => Some(ChangeReason::Added),
                Some(previous) => first_difference(previous, component)
                    .map(ChangeReason::Section)
                    .or_else(|| changes.reason_for(component)),
            };
            if let Some(reason) = reason {
                affected.insert(key.clone(), reason);
            }
        }
        for (key, component) in &before {
            if reportable(component) && !after.contains_key(key) {
                affected.insert(key.clone(), ChangeReason::Removed);
            }
        }

        let graph = DependencyGraph::build(&after);
        let directly: Vec<ComponentKey> = affected.keys().cloned().collect();
        for dependent in graph.dependents_closure(&directly) {
            if after.get(&dependent).is_some_and(reportable) {
                affected.entry(dependent).or_insert(ChangeReason::Dependent);
            }
        }

        let order = graph.order(affected.keys().cloned().collect())?;
        let entries: Vec<AffectedEntry> = order
            .into_iter()
            .filter_map(|key| {
                let reason = affected.remove(&key)?;
                let (stack, component_type, component) = key;
                Some(AffectedEntry {
                    included_as_dependent: reason == ChangeReason::Dependent,
                    component,
                    component_type,
                    stack,
                    reason,
                })
            })
            .collect();

        tracing::info!(affected = entries.len(), %base, target = target.unwrap_or("working tree"), "Affected components detected");
        Ok(entries)
    }

    fn materialize(&self, revision: &str, dest: &Path) -> Result<()> {
        self.revisions
            .materialize(revision, dest)
            .map_err(|source| Error::AffectedDetection {
                revision: revision.to_string(),
                source,
            })
    }

    fn resolve_side(&self, config: StrataConfig) -> Result<BTreeMap<ComponentKey, ComponentConfig>> {
        let resolver = Resolver::new(config, self.collaborators.clone()).with_options(self.options.clone());
        let components = resolver.resolve_components(&ResolveFilter::default())?;
        Ok(components.into_iter().map(|c| (key_of(&c), c)).collect())
    }
}

fn canonical(path: &NormalizedPath) -> NormalizedPath {
    NormalizedPath::canonicalize(path.to_native()).unwrap_or_else(|_| path.clone())
}

/// Abstract and disabled components are never reported.
fn reportable(component: &ComponentConfig) -> bool {
    !component.is_abstract() && component.is_enabled()
}

/// Name of the first top-level entry that differs, in key order.
fn first_difference(before: &ComponentConfig, after: &ComponentConfig) -> Option<String> {
    let before = before.comparable();
    let after = after.comparable();
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .find(|key| before.get(*key) != after.get(*key))
        .cloned()
}

/// Files changed between the two revisions, relative to the repository root.
struct Changes<'c> {
    files: &'c [String],
    /// The base path relative to the repository root.
    repo_base: Option<String>,
    config: &'c StrataConfig,
}

impl Changes<'_> {
    fn repo_relative(&self, path: &str) -> Option<String> {
        let base = self.repo_base.as_ref()?;
        let path = path.trim_start_matches("./").trim_end_matches('/');
        Some(if base.is_empty() {
            path.to_string()
        } else {
            format!("{base}/{path}")
        })
    }

    fn touches_folder(&self, folder: &str) -> bool {
        let prefix = format!("{folder}/");
        self.files.iter().any(|f| f.starts_with(&prefix))
    }

    fn reason_for(&self, component: &ComponentConfig) -> Option<ChangeReason> {
        let component_base = match component.component_type {
            ComponentType::Terraform => &self.config.components.terraform.base_path,
            ComponentType::Helmfile => &self.config.components.helmfile.base_path,
        };
        if let Some(folder) = self.repo_relative(&format!(
            "{}/{}",
            component_base.trim_end_matches('/'),
            component.folder
        )) && self.touches_folder(&folder)
        {
            return Some(ChangeReason::Component);
        }

        for dependency in dependencies(component) {
            if let Some(file) = dependency.file.as_deref().and_then(|f| self.repo_relative(f))
                && self.files.contains(&file)
            {
                return Some(ChangeReason::File);
            }
            if let Some(folder) = dependency.folder.as_deref().and_then(|f| self.repo_relative(f))
                && self.touches_folder(&folder)
            {
                return Some(ChangeReason::Folder);
            }
        }
        None
    }
}

/// Edges from each component to the components it depends on.
struct DependencyGraph {
    depends_on: BTreeMap<ComponentKey, BTreeSet<ComponentKey>>,
}

impl DependencyGraph {
    fn build(components: &BTreeMap<ComponentKey, ComponentConfig>) -> Self {
        let mut depends_on: BTreeMap<ComponentKey, BTreeSet<ComponentKey>> = BTreeMap::new();
        for (key, component) in components {
            let edges = depends_on.entry(key.clone()).or_default();
            for dependency in dependencies(component) {
                let Some(name) = dependency.component else {
                    continue;
                };
                let stack = dependency.stack.unwrap_or_else(|| component.stack.clone());
                let same_type = (stack.clone(), component.component_type, name.clone());
                let target = if components.contains_key(&same_type) {
                    Some(same_type)
                } else {
                    ComponentType::ALL
                        .into_iter()
                        .map(|kind| (stack.clone(), kind, name.clone()))
                        .find(|candidate| components.contains_key(candidate))
                };
                match target {
                    Some(target) if target != *key => {
                        edges.insert(target);
                    }
                    Some(_) => {}
                    None => tracing::debug!(
                        component = %component.name,
                        stack = %component.stack,
                        dependency = %name,
                        "Dependency not found, ignoring"
                    ),
                }
            }
        }
        Self { depends_on }
    }

    /// Every component that transitively depends on one of `roots`.
    fn dependents_closure(&self, roots: &[ComponentKey]) -> BTreeSet<ComponentKey> {
        let mut dependents: BTreeMap<&ComponentKey, Vec<&ComponentKey>> = BTreeMap::new();
        for (component, targets) in &self.depends_on {
            for target in targets {
                dependents.entry(target).or_default().push(component);
            }
        }

        let mut found = BTreeSet::new();
        let mut stack: Vec<&ComponentKey> = roots.iter().collect();
        while let Some(next) = stack.pop() {
            for dependent in dependents.get(next).into_iter().flatten() {
                if !roots.contains(*dependent) && found.insert((*dependent).clone()) {
                    stack.push(*dependent);
                }
            }
        }
        found
    }

    /// Topological order of `selected`, dependencies first, ties broken by
    /// stack, type and name.
    fn order(&self, selected: BTreeSet<ComponentKey>) -> Result<Vec<ComponentKey>> {
        let mut pending: BTreeMap<&ComponentKey, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&ComponentKey, Vec<&ComponentKey>> = BTreeMap::new();
        for key in &selected {
            let edges = self
                .depends_on
                .get(key)
                .into_iter()
                .flatten()
                .filter(|target| selected.contains(*target));
            let mut count = 0;
            for target in edges {
                dependents.entry(target).or_default().push(key);
                count += 1;
            }
            pending.insert(key, count);
        }

        let mut ready: BTreeSet<&ComponentKey> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(key, _)| *key)
            .collect();
        let mut ordered = Vec::with_capacity(selected.len());
        while let Some(key) = ready.pop_first() {
            ordered.push(key.clone());
            for dependent in dependents.get(key).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if ordered.len() < selected.len() {
            let components = pending
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(key, _)| display_key(key))
                .collect();
            return Err(Error::DependencyCycle { components });
        }
        Ok(ordered)
    }
}
