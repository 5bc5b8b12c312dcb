//! Git repository fixtures.
//!
//! Everything goes through `git2`, so tests do not need a `git` binary or a
//! global identity.

use std::path::Path;

use git2::{IndexAddOption, Repository, Signature};

/// Initialise a repository at `path` with a local test identity.
///
/// # Panics
/// Panics if the repository cannot be created.
pub fn init_repo(path: &Path) -> Repository {
    let repo = Repository::init(path)
        .unwrap_or_else(|e| panic!("init_repo: failed at {}: {e}", path.display()));
    {
        let mut config = repo
            .config()
            .unwrap_or_else(|e| panic!("init_repo: no config: {e}"));
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        config.set_bool("commit.gpgsign", false).unwrap();
    }
    repo
}

/// Stage every file under the work tree and commit it on `HEAD`.
///
/// Returns the new commit id as a hex string, usable as a revision.
///
/// # Panics
/// Panics if staging or committing fails.
pub fn commit_all(path: &Path, message: &str) -> String {
    let repo = Repository::open(path)
        .unwrap_or_else(|e| panic!("commit_all: cannot open {}: {e}", path.display()));

    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.update_all(["*"].iter(), None).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let signature = Signature::now("Test User", "test@test.com").unwrap();
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    let oid = repo
        .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap_or_else(|e| panic!("commit_all: commit failed: {e}"));
    oid.to_string()
}
