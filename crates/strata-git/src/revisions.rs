//! `git2`-backed revision provider

use std::collections::BTreeSet;
use std::path::Path;

use git2::{DiffOptions, ObjectType, Repository, Tree, TreeWalkMode, TreeWalkResult};
use strata_fs::{NormalizedPath, io};

use crate::{Error, Result, RevisionProvider};

/// Revision access for the repository containing a given path.
#[derive(Debug, Clone)]
pub struct GitRevisions {
    root: NormalizedPath,
}

impl GitRevisions {
    /// Discover the repository that contains `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::discover(path).map_err(|_| Error::NotARepository {
            path: path.to_path_buf(),
        })?;
        let workdir = repo.workdir().ok_or_else(|| Error::NotARepository {
            path: path.to_path_buf(),
        })?;
        Ok(Self {
            root: NormalizedPath::new(workdir),
        })
    }

    fn repository(&self) -> Result<Repository> {
        Ok(Repository::open(self.root.to_native())?)
    }

    fn tree<'r>(repo: &'r Repository, revision: &str) -> Result<Tree<'r>> {
        let object = repo
            .revparse_single(revision)
            .map_err(|_| Error::RevisionNotFound {
                revision: revision.to_string(),
            })?;
        Ok(object.peel_to_tree()?)
    }
}

impl RevisionProvider for GitRevisions {
    fn root(&self) -> &NormalizedPath {
        &self.root
    }

    fn materialize(&self, revision: &str, dest: &Path) -> Result<()> {
        let repo = self.repository()?;
        let tree = Self::tree(&repo, revision)?;
        let dest = NormalizedPath::new(dest);

        tracing::debug!(%revision, dest = %dest, "Materializing revision");

        let mut failure: Option<Error> = None;
        let mut written = 0usize;
        let walked = tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() != Some(ObjectType::Blob) {
                return TreeWalkResult::Ok;
            }
            let Some(name) = entry.name() else {
                return TreeWalkResult::Ok;
            };
            let target = dest.join(&format!("{dir}{name}"));
            let result = entry
                .to_object(&repo)
                .and_then(|object| object.peel_to_blob())
                .map_err(Error::from)
                .and_then(|blob| io::write_bytes(&target, blob.content()).map_err(Error::from));
            match result {
                Ok(()) => {
                    written += 1;
                    TreeWalkResult::Ok
                }
                Err(e) => {
                    failure = Some(e);
                    TreeWalkResult::Abort
                }
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        walked?;

        tracing::debug!(%revision, files = written, "Revision materialized");
        Ok(())
    }

    fn changed_files(&self, base: &str, target: Option<&str>) -> Result<Vec<String>> {
        let repo = self.repository()?;
        let base_tree = Self::tree(&repo, base)?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);

        let diff = match target {
            Some(target) => {
                let target_tree = Self::tree(&repo, target)?;
                repo.diff_tree_to_tree(Some(&base_tree), Some(&target_tree), Some(&mut opts))?
            }
            None => repo.diff_tree_to_workdir_with_index(Some(&base_tree), Some(&mut opts))?,
        };

        let mut files = BTreeSet::new();
        for delta in diff.deltas() {
            for file in [delta.old_file(), delta.new_file()] {
                if let Some(path) = file.path() {
                    files.insert(NormalizedPath::new(path).as_str().to_string());
                }
            }
        }

        Ok(files.into_iter().collect())
    }
}
