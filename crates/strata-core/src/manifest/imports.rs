//! Import expansion
//!
//! A manifest's `import` list names other manifests, each optionally with a
//! template context. Expansion is depth-first: an import's own imports come
//! before it, and all imports come before the importing manifest, so the
//! resulting fragment list is already in merge order.

use std::collections::BTreeSet;

use strata_fs::{GlobPattern, NormalizedPath, has_glob_meta};

use crate::merge::{MergeOptions, merge, merge_into};
use crate::template::{TemplateEngine, has_template_actions};
use crate::value::{Mapping, Value};
use crate::{Error, Result};

use super::{ManifestFile, dedupe_by_logical_name, has_manifest_suffix, with_suffix_variants};

const IMPORT_KEY: &str = "import";

/// One entry of an `import` list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSpec {
    pub path: String,
    /// Template data rendered into the imported manifest.
    pub context: Mapping,
    pub skip_if_missing: bool,
    pub skip_templates_processing: bool,
}

impl ImportSpec {
    /// Parse the `import` section of a manifest.
    pub fn parse_list(section: Option<&Value>, file: &ManifestFile) -> Result<Vec<ImportSpec>> {
        let invalid = |message: String| Error::ManifestParse {
            path: file.relative().to_string(),
            message,
        };
        let items = match section {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::String(s)) => return Ok(vec![ImportSpec::from_path(s)]),
            Some(Value::Sequence(items)) => items,
            Some(other) => {
                return Err(invalid(format!(
                    "'import' must be a list, found {}",
                    other.type_name()
                )));
            }
        };

        items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(ImportSpec::from_path(s)),
                Value::Mapping(m) => {
                    let path = m
                        .get("path")
                        .and_then(Value::as_str)
                        .filter(|p| !p.trim().is_empty())
                        .ok_or_else(|| invalid("import entry has no 'path'".to_string()))?;
                    let context = match m.get("context") {
                        None | Some(Value::Null) => Mapping::new(),
                        Some(Value::Mapping(ctx)) => ctx.clone(),
                        Some(other) => {
                            return Err(invalid(format!(
                                "import context for '{path}' must be a map, found {}",
                                other.type_name()
                            )));
                        }
                    };
                    let flag = |key: &str| m.get(key).and_then(Value::as_bool).unwrap_or(false);
                    Ok(ImportSpec {
                        path: path.trim().to_string(),
                        context,
                        skip_if_missing: flag("skip_if_missing"),
                        skip_templates_processing: flag("skip_templates_processing"),
                    })
                }
                other => Err(invalid(format!(
                    "import entries must be strings or maps, found {}",
                    other.type_name()
                ))),
            })
            .collect()
    }

    fn from_path(path: &str) -> Self {
        ImportSpec {
            path: path.trim().to_string(),
            ..ImportSpec::default()
        }
    }
}

/// The parsed content of one manifest in an expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestFragment {
    pub file: ManifestFile,
    /// Manifest content with the `import` section removed.
    pub content: Mapping,
    /// Import nesting level; 0 for the top-level manifest.
    pub depth: usize,
}

impl ManifestFragment {
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }
}

/// A top-level manifest with all its imports expanded.
#[derive(Debug, Clone)]
pub struct ExpandedManifest {
    pub root: ManifestFile,
    /// Fragments in merge order; the top-level manifest is last.
    pub fragments: Vec<ManifestFragment>,
    /// Skipped optional imports.
    pub warnings: Vec<String>,
}

impl ExpandedManifest {
    /// Merge all fragments into the stack's configuration.
    ///
    /// A merge conflict is reported against the fragment that caused it.
    pub fn merge(&self, options: MergeOptions) -> Result<Mapping> {
        let mut merged = Mapping::new();
        for fragment in &self.fragments {
            merge_into(&mut merged, &fragment.content, options)
                .map_err(|e| e.in_manifest(fragment.file.relative()))?;
        }
        Ok(merged)
    }

    /// Relative paths of every merged manifest, in merge order.
    pub fn sources(&self) -> Vec<String> {
        self.fragments
            .iter()
            .map(|f| f.file.relative().to_string())
            .collect()
    }
}

/// Mutable state of one expansion.
#[derive(Default)]
struct Expansion {
    /// Files on the current import branch, for cycle detection.
    branch: Vec<NormalizedPath>,
    /// Already expanded (file, context) pairs.
    done: BTreeSet<(NormalizedPath, String)>,
    fragments: Vec<ManifestFragment>,
    warnings: Vec<String>,
}

/// Expands `import` lists.
pub struct ImportResolver<'a> {
    stacks_base: NormalizedPath,
    max_depth: usize,
    ignore_missing: bool,
    templates: &'a dyn TemplateEngine,
}

impl<'a> ImportResolver<'a> {
    pub fn new(stacks_base: NormalizedPath, max_depth: usize, templates: &'a dyn TemplateEngine) -> Self {
        Self {
            stacks_base,
            max_depth,
            ignore_missing: false,
            templates,
        }
    }

    /// Treat every missing import as optional.
    pub fn ignore_missing(mut self, ignore: bool) -> Self {
        self.ignore_missing = ignore;
        self
    }

    /// Expand a top-level manifest.
    pub fn expand(&self, root: &ManifestFile) -> Result<ExpandedManifest> {
        let mut state = Expansion::default();
        self.visit(root, &Mapping::new(), false, 0, &mut state)?;
        tracing::debug!(
            manifest = %root.relative(),
            fragments = state.fragments.len(),
            "Expanded imports"
        );
        Ok(ExpandedManifest {
            root: root.clone(),
            fragments: state.fragments,
            warnings: state.warnings,
        })
    }

    fn visit(
        &self,
        file: &ManifestFile,
        context: &Mapping,
        skip_templates: bool,
        depth: usize,
        state: &mut Expansion,
    ) -> Result<()> {
        state.branch.push(file.path().clone());
        let (content, specs) = self.load(file, context, skip_templates)?;

        for spec in specs {
            let child_context = merge([context, &spec.context], MergeOptions::default())?;
            for child in self.resolve(file, &spec, state)? {
                if let Some(start) = state.branch.iter().position(|p| p == child.path()) {
                    let mut cycle: Vec<String> = state.branch[start..]
                        .iter()
                        .map(|p| self.display(p))
                        .collect();
                    cycle.push(self.display(child.path()));
                    return Err(Error::ImportCycle { cycle });
                }
                let key = (child.path().clone(), context_key(&child_context)?);
                if state.done.contains(&key) {
                    tracing::trace!(import = %child.relative(), "Import already expanded");
                    continue;
                }
                if depth + 1 > self.max_depth {
                    let mut chain: Vec<String> = state.branch.iter().map(|p| self.display(p)).collect();
                    chain.push(self.display(child.path()));
                    return Err(Error::ImportDepthExceeded {
                        path: child.relative().to_string(),
                        max_depth: self.max_depth,
                        chain,
                    });
                }
                self.visit(
                    &child,
                    &child_context,
                    skip_templates || spec.skip_templates_processing,
                    depth + 1,
                    state,
                )?;
            }
        }

        state.branch.pop();
        state
            .done
            .insert((file.path().clone(), context_key(context)?));
        state.fragments.push(ManifestFragment {
            file: file.clone(),
            content,
            depth,
        });
        Ok(())
    }

    /// Read, render and parse one manifest.
    fn load(
        &self,
        file: &ManifestFile,
        context: &Mapping,
        skip_templates: bool,
    ) -> Result<(Mapping, Vec<ImportSpec>)> {
        let mut text = strata_fs::io::read_text(file.path())?;
        if !skip_templates && !context.is_empty() && has_template_actions(&text) {
            text = self
                .templates
                .render(&text, &Value::Mapping(context.clone()))
                .map_err(|e| Error::ManifestParse {
                    path: file.relative().to_string(),
                    message: e.to_string(),
                })?;
        }

        let parsed = Value::parse_yaml(&text).map_err(|e| Error::ManifestParse {
            path: file.relative().to_string(),
            message: e.to_string(),
        })?;
        let mut content = match parsed {
            Value::Null => Mapping::new(),
            Value::Mapping(m) => m,
            other => {
                return Err(Error::ManifestParse {
                    path: file.relative().to_string(),
                    message: format!("expected a map at the top level, found {}", other.type_name()),
                });
            }
        };
        let specs = ImportSpec::parse_list(content.get(IMPORT_KEY), file)?;
        content.remove(IMPORT_KEY);
        Ok((content, specs))
    }

    /// Files an import entry refers to, in merge order.
    fn resolve(
        &self,
        importer: &ManifestFile,
        spec: &ImportSpec,
        state: &mut Expansion,
    ) -> Result<Vec<ManifestFile>> {
        let base = if spec.path.starts_with("./") || spec.path.starts_with("../") {
            importer.path().parent().unwrap_or_else(|| self.stacks_base.clone())
        } else {
            self.stacks_base.clone()
        };
        let candidate = base.join(&spec.path);

        let files = if has_glob_meta(&spec.path) {
            let mut found = Vec::new();
            for pattern in with_suffix_variants(candidate.as_str()) {
                found.extend(
                    GlobPattern::new(&pattern)?
                        .expand()?
                        .into_iter()
                        .filter(|p| p.file_name().is_some_and(has_manifest_suffix))
                        .map(|p| ManifestFile::new(p, &self.stacks_base)),
                );
            }
            let mut files = dedupe_by_logical_name(found);
            files.sort_by(|a, b| a.path().cmp(b.path()));
            files
        } else {
            with_suffix_variants(candidate.as_str())
                .into_iter()
                .map(NormalizedPath::new)
                .find(NormalizedPath::is_file)
                .map(|p| vec![ManifestFile::new(p, &self.stacks_base)])
                .unwrap_or_default()
        };

        if files.is_empty() {
            if spec.skip_if_missing || self.ignore_missing {
                let warning = format!(
                    "import '{}' in '{}' matched no manifests, skipping",
                    spec.path,
                    importer.relative()
                );
                tracing::warn!(import = %spec.path, importer = %importer.relative(), "Skipping missing import");
                state.warnings.push(warning);
                return Ok(Vec::new());
            }
            return Err(Error::ManifestNotFound {
                path: spec.path.clone(),
                importer: importer.relative().to_string(),
            });
        }
        Ok(files)
    }

    fn display(&self, path: &NormalizedPath) -> String {
        path.strip_prefix(&self.stacks_base)
            .unwrap_or(path.as_str())
            .to_string()
    }
}

/// Identity of an import context, so one file can be expanded once per
/// distinct context.
fn context_key(context: &Mapping) -> Result<String> {
    if context.is_empty() {
        Ok(String::new())
    } else {
        Ok(serde_json::to_string(context)?)
    }
}
