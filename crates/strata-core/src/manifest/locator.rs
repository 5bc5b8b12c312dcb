//! Top-level manifest discovery

use std::collections::BTreeSet;

use strata_fs::{GlobPattern, NormalizedPath};

use crate::config::StrataConfig;
use crate::{Error, Result};

use super::{ManifestFile, dedupe_by_logical_name, has_manifest_suffix, with_suffix_variants};

/// The manifests selected for a resolution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedManifests {
    /// Sorted shallow-first, then by path.
    pub files: Vec<ManifestFile>,
    /// The target named one file directly; only that file is returned.
    pub physical: bool,
}

/// Finds top-level manifests under the stacks directory.
#[derive(Debug, Clone)]
pub struct ManifestLocator {
    stacks_base: NormalizedPath,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl ManifestLocator {
    /// `include` and `exclude` are globs relative to `stacks_base`.
    pub fn new(stacks_base: NormalizedPath, include: Vec<String>, exclude: Vec<String>) -> Self {
        // Walked paths are reported through symlinks resolved; the base
        // must be in the same form for relative names to line up.
        let stacks_base = NormalizedPath::canonicalize(stacks_base.to_native()).unwrap_or(stacks_base);
        Self {
            stacks_base,
            include,
            exclude,
        }
    }

    pub fn from_config(config: &StrataConfig) -> Self {
        Self::new(
            config.stacks_base_path(),
            config.stacks.included_paths.clone(),
            config.stacks.excluded_paths.clone(),
        )
    }

    pub fn stacks_base(&self) -> &NormalizedPath {
        &self.stacks_base
    }

    fn absolute(&self, pattern: &str) -> String {
        self.stacks_base.join(pattern).as_str().to_string()
    }

    /// The manifest file a `/`-separated target names, if it exists on
    /// disk. Include and exclude patterns do not apply.
    fn manifest_at(&self, target: &str) -> Option<ManifestFile> {
        if !target.contains('/') {
            return None;
        }
        with_suffix_variants(self.stacks_base.join(target).as_str())
            .into_iter()
            .map(NormalizedPath::new)
            .filter(|path| path.file_name().is_some_and(has_manifest_suffix))
            .find(NormalizedPath::is_file)
            .map(|path| ManifestFile::new(path, &self.stacks_base))
    }

    /// Discover manifests.
    ///
    /// With a `target` containing `/` that names one manifest file (with or
    /// without suffix), only that file is returned and `physical` is set.
    pub fn locate(&self, target: Option<&str>) -> Result<LocatedManifests> {
        if let Some(file) = target.and_then(|t| self.manifest_at(t)) {
            tracing::debug!(manifest = %file.relative(), "Target names a manifest file");
            return Ok(LocatedManifests {
                files: vec![file],
                physical: true,
            });
        }

        let excludes = self
            .exclude
            .iter()
            .map(|p| GlobPattern::new(&self.absolute(p)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut found = BTreeSet::new();
        for include in &self.include {
            for pattern in with_suffix_variants(include) {
                let glob = GlobPattern::new(&self.absolute(&pattern))?;
                let matches = glob.expand()?;
                if matches.is_empty() {
                    tracing::debug!(pattern = %glob.as_str(), "Include pattern matched nothing");
                }
                found.extend(
                    matches
                        .into_iter()
                        .filter(|path| path.file_name().is_some_and(has_manifest_suffix)),
                );
            }
        }

        let files: Vec<ManifestFile> = found
            .into_iter()
            .filter(|path| !excludes.iter().any(|ex| ex.is_match(path.to_native())))
            .map(|path| ManifestFile::new(path, &self.stacks_base))
            .collect();
        let mut files = dedupe_by_logical_name(files);

        if files.is_empty() {
            return Err(Error::NoManifestsFound {
                target: target.map_or_else(|| "all stacks".to_string(), |t| format!("'{t}'")),
                patterns: self.include.iter().map(|p| self.absolute(p)).collect(),
            });
        }

        files.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.path().cmp(b.path())));
        tracing::debug!(count = files.len(), "Located stack manifests");
        Ok(LocatedManifests {
            files,
            physical: false,
        })
    }
}
