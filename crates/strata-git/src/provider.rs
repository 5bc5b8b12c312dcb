//! Revision provider trait

use std::path::Path;

use strata_fs::NormalizedPath;

use crate::Result;

/// Read access to the repository history.
///
/// Revisions are anything the backend can resolve (`main`, `HEAD~1`, a
/// commit id). Paths are repository-relative with forward slashes.
pub trait RevisionProvider: Send + Sync {
    /// Root of the working tree.
    fn root(&self) -> &NormalizedPath;

    /// Write every file of `revision` into `dest`.
    fn materialize(&self, revision: &str, dest: &Path) -> Result<()>;

    /// Files that differ between `base` and `target`.
    ///
    /// `target = None` compares against the current working tree, including
    /// uncommitted changes.
    fn changed_files(&self, base: &str, target: Option<&str>) -> Result<Vec<String>>;
}
