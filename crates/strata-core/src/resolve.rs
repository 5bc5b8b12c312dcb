//! End-to-end stack resolution
//!
//! [`Resolver`] runs the whole pipeline for every located manifest:
//! import expansion, merge, inheritance, stack naming and function
//! evaluation. It owns the function caches, so two resolvers never share
//! memoized results.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::cancel::Cancellation;
use crate::component::{ComponentConfig, ComponentType, DATA_SECTIONS};
use crate::config::StrataConfig;
use crate::context::{ComponentTokens, StackNaming, replace_context_tokens};
use crate::functions::{
    Collaborators, ComponentLookup, EvaluationScope, FunctionCache, FunctionEvaluator, OutputTarget,
};
use crate::inheritance::{InheritanceResolver, ProvenanceEntry, trace_sources};
use crate::manifest::{ExpandedManifest, ImportResolver, ManifestFile, ManifestLocator};
use crate::value::{Mapping, Value};
use crate::{Error, Result};

/// Behavior switches for a resolution run.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Skip imports that do not exist instead of failing.
    pub ignore_missing_imports: bool,
    /// Keep the raw value when a function's collaborator fails.
    pub lenient_functions: bool,
    /// Evaluate function calls; when off, they stay as strings.
    pub process_functions: bool,
    pub cancellation: Cancellation,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            ignore_missing_imports: false,
            lenient_functions: false,
            process_functions: true,
            cancellation: Cancellation::new(),
        }
    }
}

/// Which stacks, components and sections to return.
///
/// Empty lists select everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveFilter {
    pub stacks: Vec<String>,
    pub components: Vec<String>,
    pub sections: Vec<String>,
}

impl ResolveFilter {
    pub fn stack(mut self, stack: impl Into<String>) -> Self {
        self.stacks.push(stack.into());
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.components.push(component.into());
        self
    }

    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.sections.push(section.into());
        self
    }

    /// A stack may be named by its computed name or its manifest path.
    fn matches_stack(&self, stack: &str, manifest: &ManifestFile) -> bool {
        self.stacks.is_empty()
            || self.stacks.iter().any(|s| {
                s == stack || s == manifest.logical_name() || s == manifest.relative()
            })
    }

    fn matches_component(&self, component: &str) -> bool {
        self.components.is_empty() || self.components.iter().any(|c| c == component)
    }

    fn single_stack(&self) -> Option<&str> {
        match self.stacks.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}

/// Resolved configuration: stack -> component type -> component -> sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedStacks {
    stacks: BTreeMap<String, BTreeMap<ComponentType, BTreeMap<String, Mapping>>>,
}

impl ResolvedStacks {
    pub fn insert(&mut self, stack: &str, component_type: ComponentType, component: &str, sections: Mapping) {
        self.stacks
            .entry(stack.to_string())
            .or_default()
            .entry(component_type)
            .or_default()
            .insert(component.to_string(), sections);
    }

    pub fn get(&self, stack: &str, component_type: ComponentType, component: &str) -> Option<&Mapping> {
        self.stacks.get(stack)?.get(&component_type)?.get(component)
    }

    pub fn stack_names(&self) -> impl Iterator<Item = &str> {
        self.stacks.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Every component entry, in stack, type, name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ComponentType, &str, &Mapping)> {
        self.stacks.iter().flat_map(|(stack, types)| {
            types.iter().flat_map(move |(kind, components)| {
                components
                    .iter()
                    .map(move |(name, sections)| (stack.as_str(), *kind, name.as_str(), sections))
            })
        })
    }
}

/// A top-level manifest with its imports expanded and merged.
#[derive(Debug, Clone)]
pub struct ProcessedManifest {
    pub expanded: ExpandedManifest,
    pub merged: Mapping,
}

impl ProcessedManifest {
    pub fn file(&self) -> &ManifestFile {
        &self.expanded.root
    }
}

type TargetIndex = BTreeMap<(String, String), OutputTarget>;

/// Runs stack resolution against one configuration.
pub struct Resolver {
    config: StrataConfig,
    collaborators: Collaborators,
    cache: Arc<FunctionCache>,
    options: ResolveOptions,
    naming: StackNaming,
    targets: Mutex<Option<Arc<TargetIndex>>>,
    warnings: Mutex<Vec<String>>,
}

impl Resolver {
    pub fn new(config: StrataConfig, collaborators: Collaborators) -> Self {
        let naming = StackNaming::from_config(&config);
        Self {
            config,
            collaborators,
            cache: Arc::new(FunctionCache::new()),
            options: ResolveOptions::default(),
            naming,
            targets: Mutex::new(None),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Share memoized function results with another resolver.
    pub fn with_cache(mut self, cache: Arc<FunctionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<FunctionCache> {
        &self.cache
    }

    /// Warnings from skipped imports and lenient function failures.
    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.lock().unwrap_or_else(|p| p.into_inner()))
    }

    fn warn_all(&self, warnings: impl IntoIterator<Item = String>) {
        self.warnings
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend(warnings);
    }

    pub fn locator(&self) -> ManifestLocator {
        ManifestLocator::from_config(&self.config)
    }

    /// Expand imports of a top-level manifest and merge the result.
    pub fn process_manifest(&self, file: &ManifestFile) -> Result<ProcessedManifest> {
        let manifest = self.expand_manifest(file)?;
        self.warn_all(manifest.expanded.warnings.iter().cloned());
        Ok(manifest)
    }

    /// Like [`Resolver::process_manifest`], without recording warnings.
    fn expand_manifest(&self, file: &ManifestFile) -> Result<ProcessedManifest> {
        let locator = self.locator();
        let imports = ImportResolver::new(
            locator.stacks_base().clone(),
            self.config.imports.max_depth,
            self.collaborators.templates.as_ref(),
        )
        .ignore_missing(self.options.ignore_missing_imports);
        let expanded = imports.expand(file)?;
        let merged = expanded.merge(self.config.merge_options())?;
        Ok(ProcessedManifest { expanded, merged })
    }

    /// Every component of a processed manifest, before function evaluation.
    pub fn components_of(&self, manifest: &ProcessedManifest) -> Result<Vec<ComponentConfig>> {
        let options = self.config.merge_options();
        let mut components = Vec::new();
        for component_type in ComponentType::ALL {
            let inheritance = InheritanceResolver::new(&manifest.merged, component_type, options);
            for name in inheritance.component_names() {
                let component = self
                    .build_component(manifest, &inheritance, component_type, &name)
                    .map_err(|e| e.in_component(&name, manifest.file().relative()))?;
                components.push(component);
            }
        }
        Ok(components)
    }

    fn build_component(
        &self,
        manifest: &ProcessedManifest,
        inheritance: &InheritanceResolver<'_>,
        component_type: ComponentType,
        name: &str,
    ) -> Result<ComponentConfig> {
        let sections = inheritance.resolve(name)?;
        let mut component = ComponentConfig {
            name: name.to_string(),
            component_type,
            stack: String::new(),
            stack_file: manifest.file().relative().to_string(),
            folder: sections.folder,
            vars: sections.vars,
            env: sections.env,
            settings: sections.settings,
            backend_type: sections.backend_type,
            backend: sections.backend,
            providers: sections.providers,
            metadata: sections.metadata,
            inheritance: sections.chain.inheritance(),
            imports: manifest.expanded.sources(),
            workspace: None,
        };
        component.stack = self.naming.stack_name(
            &component.to_mapping(),
            manifest.file(),
            self.collaborators.templates.as_ref(),
        )?;
        if component_type == ComponentType::Terraform {
            component.workspace = Some(self.workspace(&component, sections.base_component.as_deref()));
        }
        Ok(component)
    }

    /// Workspace name of a terraform component.
    ///
    /// An explicit `metadata.terraform_workspace` or
    /// `metadata.terraform_workspace_pattern` wins. Otherwise the stack name
    /// is used, suffixed with the component name for derived components.
    fn workspace(&self, component: &ComponentConfig, base_component: Option<&str>) -> String {
        let component_path = format!(
            "{}/{}",
            self.config.components.terraform.base_path.trim_end_matches('/'),
            component.folder
        );
        let tokens = ComponentTokens {
            component: &component.name,
            base_component: base_component.unwrap_or_default(),
            component_path: &component_path,
            workspace: "",
        };
        let metadata_str = |key: &str| component.metadata.get(key).and_then(Value::as_str);
        let workspace = if let Some(explicit) = metadata_str("terraform_workspace") {
            replace_context_tokens(&component.context(), &tokens, explicit)
        } else if let Some(pattern) = metadata_str("terraform_workspace_pattern") {
            replace_context_tokens(&component.context(), &tokens, pattern)
        } else if base_component.is_none() {
            component.stack.clone()
        } else {
            format!("{}-{}", component.stack, component.name)
        };
        workspace.replace('/', "-")
    }

    fn evaluator(&self) -> FunctionEvaluator<'_> {
        FunctionEvaluator::new(&self.collaborators, &self.cache, self, self.config.base())
            .with_cancellation(self.options.cancellation.clone())
            .with_timeout(self.config.functions.timeout_secs.map(Duration::from_secs))
            .lenient(self.options.lenient_functions)
    }

    /// Replace function calls in the component's data sections.
    pub fn evaluate(&self, mut component: ComponentConfig) -> Result<ComponentConfig> {
        if !self.options.process_functions {
            return Ok(component);
        }
        let data = Value::Mapping(component.to_mapping());
        let stack = component.stack.clone();
        let name = component.name.clone();
        let scope = EvaluationScope {
            stack: &stack,
            component: &name,
            data: &data,
        };
        let evaluator = self.evaluator();
        for section in DATA_SECTIONS {
            if let Some(values) = component.section_mut(section) {
                *values = evaluator.evaluate_mapping(values, &scope)?;
            }
        }
        self.warn_all(evaluator.take_warnings());
        Ok(component)
    }

    /// Fully resolved components matching the filter, sorted by stack,
    /// type and name.
    ///
    /// A component defined by more than one manifest for the same stack is
    /// taken from the first manifest in discovery order.
    pub fn resolve_components(&self, filter: &ResolveFilter) -> Result<Vec<ComponentConfig>> {
        let located = self.locator().locate(filter.single_stack())?;
        let mut seen: BTreeMap<(String, ComponentType, String), String> = BTreeMap::new();
        let mut resolved = Vec::new();

        for file in &located.files {
            self.options.cancellation.check()?;
            let manifest = self.process_manifest(file)?;
            for component in self.components_of(&manifest)? {
                let stack_matches = located.physical || filter.matches_stack(&component.stack, file);
                if !stack_matches || !filter.matches_component(&component.name) {
                    continue;
                }
                let key = (
                    component.stack.clone(),
                    component.component_type,
                    component.name.clone(),
                );
                if let Some(first) = seen.get(&key) {
                    tracing::warn!(
                        stack = %component.stack,
                        component = %component.name,
                        first = %first,
                        duplicate = %file.relative(),
                        "Component defined by more than one manifest, keeping the first"
                    );
                    continue;
                }
                seen.insert(key, file.relative().to_string());
                let name = component.name.clone();
                let evaluated = self
                    .evaluate(component)
                    .map_err(|e| e.in_component(name, file.relative()))?;
                resolved.push(evaluated);
            }
        }

        resolved.sort_by(|a, b| {
            (a.stack.as_str(), a.component_type, a.name.as_str())
                .cmp(&(b.stack.as_str(), b.component_type, b.name.as_str()))
        });
        tracing::info!(components = resolved.len(), manifests = located.files.len(), "Resolved stacks");
        Ok(resolved)
    }

    /// Resolve into the nested stacks map. Stacks with no selected
    /// components do not appear.
    pub fn resolve(&self, filter: &ResolveFilter) -> Result<ResolvedStacks> {
        let mut stacks = ResolvedStacks::default();
        for component in self.resolve_components(filter)? {
            stacks.insert(
                &component.stack,
                component.component_type,
                &component.name,
                component.project(&filter.sections),
            );
        }
        Ok(stacks)
    }

    /// One fully resolved component.
    pub fn describe_component(&self, component: &str, stack: &str) -> Result<ComponentConfig> {
        let filter = ResolveFilter::default().stack(stack).component(component);
        self.resolve_components(&filter)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::ComponentNotFound {
                component: component.to_string(),
                stack: stack.to_string(),
            })
    }

    /// Manifest locations contributing `section.key` to a component,
    /// highest precedence first.
    pub fn sources(&self, component: &str, stack: &str, section: &str, key: &str) -> Result<Vec<ProvenanceEntry>> {
        let filter = ResolveFilter::default().stack(stack);
        let located = self.locator().locate(filter.single_stack())?;
        for file in &located.files {
            let manifest = self.process_manifest(file)?;
            for config in self.components_of(&manifest)? {
                if config.name != component
                    || !(located.physical || filter.matches_stack(&config.stack, file))
                {
                    continue;
                }
                let inheritance =
                    InheritanceResolver::new(&manifest.merged, config.component_type, self.config.merge_options());
                let chain = inheritance.chain(component)?;
                return Ok(trace_sources(
                    &manifest.expanded.fragments,
                    config.component_type,
                    &chain,
                    section,
                    key,
                ));
            }
        }
        Err(Error::ComponentNotFound {
            component: component.to_string(),
            stack: stack.to_string(),
        })
    }

    fn target_index(&self) -> Result<Arc<TargetIndex>> {
        let mut guard = self.targets.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(ref index) = *guard {
            return Ok(Arc::clone(index));
        }
        let mut index = TargetIndex::new();
        for file in self.locator().locate(None)?.files {
            let manifest = self.expand_manifest(&file)?;
            for component in self.components_of(&manifest)? {
                let folder = self
                    .config
                    .component_base_path(component.component_type)
                    .join(&component.folder);
                index
                    .entry((component.stack.clone(), component.name.clone()))
                    .or_insert(OutputTarget {
                        component: component.name,
                        component_type: component.component_type,
                        stack: component.stack,
                        folder,
                        workspace: component.workspace,
                    });
            }
        }
        let index = Arc::new(index);
        *guard = Some(Arc::clone(&index));
        Ok(index)
    }
}

impl ComponentLookup for Resolver {
    fn output_target(&self, component: &str, stack: &str) -> Result<Option<OutputTarget>> {
        let index = self.target_index()?;
        Ok(index.get(&(stack.to_string(), component.to_string())).cloned())
    }
}
