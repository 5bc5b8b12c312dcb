//! Glob expansion against a real directory tree

use std::fs;

use pretty_assertions::assert_eq;
use strata_fs::{GlobPattern, NormalizedPath};
use tempfile::TempDir;

fn touch(root: &std::path::Path, rel: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "vars: {}\n").unwrap();
}

fn relative(root: &std::path::Path, paths: Vec<NormalizedPath>) -> Vec<String> {
    let base = NormalizedPath::new(root);
    paths
        .iter()
        .map(|p| p.strip_prefix(&base).unwrap().to_string())
        .collect()
}

#[test]
fn expand_recursive_pattern_is_sorted() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "orgs/acme/prod.yaml");
    touch(dir.path(), "orgs/acme/dev.yaml");
    touch(dir.path(), "orgs/acme/notes.txt");
    touch(dir.path(), "catalog/vpc.yaml");

    let pattern = format!("{}/orgs/**/*.yaml", NormalizedPath::new(dir.path()));
    let glob = GlobPattern::new(&pattern).unwrap();

    assert_eq!(
        relative(dir.path(), glob.expand().unwrap()),
        vec!["orgs/acme/dev.yaml", "orgs/acme/prod.yaml"]
    );
}

#[test]
fn expand_missing_root_is_empty() {
    let dir = TempDir::new().unwrap();
    let pattern = format!("{}/missing/**/*.yaml", NormalizedPath::new(dir.path()));
    let glob = GlobPattern::new(&pattern).unwrap();
    assert!(glob.expand().unwrap().is_empty());
}

#[test]
fn expand_includes_hidden_files() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), ".hidden/stack.yaml");

    let pattern = format!("{}/**/*.yaml", NormalizedPath::new(dir.path()));
    let glob = GlobPattern::new(&pattern).unwrap();
    assert_eq!(relative(dir.path(), glob.expand().unwrap()), vec![".hidden/stack.yaml"]);
}
