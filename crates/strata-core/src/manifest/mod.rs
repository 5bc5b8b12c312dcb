//! Stack manifests
//!
//! [`ManifestLocator`] discovers top-level manifests from the configured
//! include and exclude globs. [`ImportResolver`] expands a manifest's
//! `import` list into the ordered fragments that are merged into one stack.

mod imports;
mod locator;

use std::collections::BTreeMap;

use strata_fs::NormalizedPath;

pub use imports::{ExpandedManifest, ImportResolver, ImportSpec, ManifestFragment};
pub use locator::{LocatedManifests, ManifestLocator};

/// Recognized manifest suffixes, highest priority first.
pub const MANIFEST_SUFFIXES: [&str; 4] = [".yaml", ".yml", ".yaml.tmpl", ".yml.tmpl"];

/// Priority of the file's suffix, lower is preferred.
fn suffix_rank(name: &str) -> Option<usize> {
    MANIFEST_SUFFIXES.iter().position(|s| name.ends_with(s))
}

pub fn has_manifest_suffix(name: &str) -> bool {
    suffix_rank(name).is_some()
}

/// The name without its manifest suffix.
pub fn strip_manifest_suffix(name: &str) -> Option<&str> {
    MANIFEST_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
}

/// A manifest on disk, identified by its path relative to the stacks
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManifestFile {
    path: NormalizedPath,
    relative: String,
}

impl ManifestFile {
    /// Files outside `stacks_base` keep their full path as relative name.
    pub fn new(path: NormalizedPath, stacks_base: &NormalizedPath) -> Self {
        let relative = path
            .strip_prefix(stacks_base)
            .filter(|r| !r.is_empty())
            .unwrap_or(path.as_str())
            .to_string();
        Self { path, relative }
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }

    /// Path relative to the stacks directory, with suffix.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// Relative path without the manifest suffix, e.g. `orgs/acme/dev`.
    pub fn logical_name(&self) -> &str {
        strip_manifest_suffix(&self.relative).unwrap_or(&self.relative)
    }

    /// Number of directories between the stacks directory and the file.
    pub fn depth(&self) -> usize {
        self.relative.split('/').filter(|s| !s.is_empty()).count()
    }
}

/// Keep one file per logical name, preferring the higher-priority suffix.
fn dedupe_by_logical_name(files: Vec<ManifestFile>) -> Vec<ManifestFile> {
    let mut best: BTreeMap<String, ManifestFile> = BTreeMap::new();
    for file in files {
        let rank = suffix_rank(file.relative()).unwrap_or(usize::MAX);
        match best.get(file.logical_name()) {
            Some(existing) if suffix_rank(existing.relative()).unwrap_or(usize::MAX) <= rank => {
                tracing::debug!(
                    kept = %existing.relative(),
                    skipped = %file.relative(),
                    "Duplicate manifest name, keeping higher-priority suffix"
                );
            }
            _ => {
                best.insert(file.logical_name().to_string(), file);
            }
        }
    }
    best.into_values().collect()
}

/// Append manifest suffixes to a pattern whose last segment has no
/// extension.
fn with_suffix_variants(pattern: &str) -> Vec<String> {
    let last = pattern.rsplit('/').next().unwrap_or(pattern);
    if has_manifest_suffix(last) || last.contains('.') {
        vec![pattern.to_string()]
    } else {
        MANIFEST_SUFFIXES
            .iter()
            .map(|suffix| format!("{pattern}{suffix}"))
            .collect()
    }
}
