//! Glob patterns over absolute paths
//!
//! A pattern such as `/repo/stacks/orgs/**/*.yaml` is split into a literal
//! root (`/repo/stacks/orgs`) and a glob anchored at that root. Matching uses
//! gitignore-style globs from the `ignore` crate, so `**` spans any number of
//! directories, including none.

use std::path::Path;

use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};

use crate::{Error, NormalizedPath, Result};

/// Characters that make a path segment a glob.
const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Whether the string contains glob metacharacters.
pub fn has_glob_meta(s: &str) -> bool {
    s.contains(GLOB_META)
}

/// A compiled glob pattern rooted at its longest literal directory prefix.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    root: NormalizedPath,
    matcher: Override,
}

impl GlobPattern {
    /// Compile a pattern. Syntax errors surface as [`Error::InvalidGlob`].
    pub fn new(pattern: &str) -> Result<Self> {
        let normalized = pattern.replace('\\', "/");
        let absolute = normalized.starts_with('/');
        let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();

        let split_at = segments
            .iter()
            .position(|s| has_glob_meta(s))
            .unwrap_or(segments.len().saturating_sub(1));

        let literal = segments[..split_at].join("/");
        let root = match (absolute, literal.is_empty()) {
            (true, _) => NormalizedPath::new(format!("/{literal}")),
            (false, true) => NormalizedPath::new("."),
            (false, false) => NormalizedPath::new(literal),
        };
        let relative = format!("/{}", segments[split_at..].join("/"));

        let mut builder = OverrideBuilder::new(root.to_native());
        builder.add(&relative).map_err(|e| Error::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let matcher = builder.build().map_err(|e| Error::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            raw: pattern.to_string(),
            root,
            matcher,
        })
    }

    /// The pattern as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The literal directory the pattern is anchored at.
    pub fn root(&self) -> &NormalizedPath {
        &self.root
    }

    /// Whether a file path matches the pattern.
    pub fn is_match(&self, path: impl AsRef<Path>) -> bool {
        let normalized = NormalizedPath::new(path);
        if normalized.strip_prefix(&self.root).is_none() {
            return false;
        }
        self.matcher.matched(normalized.to_native(), false).is_whitelist()
    }

    /// All files under the pattern root that match, sorted.
    ///
    /// A root that does not exist yields no matches rather than an error.
    pub fn expand(&self) -> Result<Vec<NormalizedPath>> {
        if !self.root.is_dir() {
            tracing::debug!(pattern = %self.raw, root = %self.root, "Glob root does not exist");
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for entry in WalkBuilder::new(self.root.to_native())
            .standard_filters(false)
            .follow_links(true)
            .build()
        {
            let entry = entry.map_err(|e| Error::Walk {
                path: self.root.to_native(),
                message: e.to_string(),
            })?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && self.is_match(entry.path()) {
                matches.push(NormalizedPath::new(entry.path()));
            }
        }

        matches.sort();
        Ok(matches)
    }
}
