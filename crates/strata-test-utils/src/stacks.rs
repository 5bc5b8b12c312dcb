//! [`TestStacks`] builder for manifest trees.
//!
//! Lays out a `strata.yaml`, a `stacks/` directory and optional component
//! folders inside a temporary directory.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Configuration used by most tests: stacks under `stacks/orgs`, shared
/// catalog under `stacks/catalog`, `_defaults.yaml` files never top-level.
pub const DEFAULT_CONFIG: &str = r#"
stacks:
  base_path: stacks
  included_paths:
    - "orgs/**/*"
  excluded_paths:
    - "**/_defaults.yaml"
  name_pattern: "{tenant}-{environment}-{stage}"
components:
  terraform:
    base_path: components/terraform
  helmfile:
    base_path: components/helmfile
"#;

/// A temporary project directory.
///
/// # Example
///
/// ```rust,no_run
/// use strata_test_utils::stacks::TestStacks;
///
/// let project = TestStacks::with_default_config();
/// project.stack("orgs/acme/prod.yaml", "vars:\n  stage: prod\n");
/// ```
pub struct TestStacks {
    temp_dir: TempDir,
}

impl Default for TestStacks {
    fn default() -> Self {
        Self::new()
    }
}

impl TestStacks {
    /// Create an empty project directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a project directory with [`DEFAULT_CONFIG`] written.
    pub fn with_default_config() -> Self {
        let project = Self::new();
        project.config(DEFAULT_CONFIG);
        project
    }

    /// Root of the project.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The `stacks/` directory.
    pub fn stacks_dir(&self) -> PathBuf {
        self.root().join("stacks")
    }

    /// Write `strata.yaml` at the project root.
    pub fn config(&self, yaml: &str) -> &Self {
        self.file("strata.yaml", yaml)
    }

    /// Write a manifest relative to `stacks/`.
    pub fn stack(&self, rel: &str, yaml: &str) -> &Self {
        self.file(&format!("stacks/{rel}"), yaml)
    }

    /// Write any file relative to the project root.
    pub fn file(&self, rel: &str, content: &str) -> &Self {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("TestStacks: failed to write {}: {e}", path.display()));
        self
    }

    /// Remove a file relative to the project root.
    pub fn remove(&self, rel: &str) -> &Self {
        fs::remove_file(self.root().join(rel)).unwrap();
        self
    }
}
