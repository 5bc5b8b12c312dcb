//! Affected-component detection against real git history

mod common;

use pretty_assertions::assert_eq;
use strata_core::{AffectedDetector, AffectedEntry, ChangeReason, ComponentType, Error};
use strata_git::GitRevisions;
use strata_test_utils::git::{commit_all, init_repo};
use strata_test_utils::stacks::TestStacks;

const STACK: &str = r#"
vars: {tenant: acme, environment: ue2, stage: dev}
components:
  terraform:
    vpc:
      vars: {cidr: 10.0.0.0/16}
    eks:
      vars: {size: 3}
      settings:
        depends_on:
          - component: vpc
    app:
      vars: {replicas: 2}
      settings:
        depends_on:
          1: {component: eks}
    dns:
      vars: {zone: example.com}
    base:
      metadata: {type: abstract}
      vars: {shared: true}
"#;

fn repo() -> (TestStacks, String) {
    let project = TestStacks::with_default_config();
    project
        .stack("orgs/acme/dev.yaml", STACK)
        .file("components/terraform/vpc/main.tf", "# vpc\n")
        .file("components/terraform/dns/main.tf", "# dns\n");
    init_repo(project.root());
    let first = commit_all(project.root(), "initial");
    (project, first)
}

fn detect(project: &TestStacks, base: &str, target: Option<&str>) -> strata_core::Result<Vec<AffectedEntry>> {
    let revisions = GitRevisions::open(project.root()).unwrap();
    let config = common::load_config(project);
    AffectedDetector::new(&config, &revisions, common::collaborators()).detect(base, target)
}

fn summary(entries: &[AffectedEntry]) -> Vec<(String, String, bool)> {
    entries
        .iter()
        .map(|e| (e.component.clone(), e.reason.to_string(), e.included_as_dependent))
        .collect()
}

fn entry(component: &str, reason: &str, dependent: bool) -> (String, String, bool) {
    (component.to_string(), reason.to_string(), dependent)
}

#[test]
fn revision_against_itself_is_empty() {
    let (project, first) = repo();
    assert!(detect(&project, &first, Some(&first)).unwrap().is_empty());
}

#[test]
fn nan_values_do_not_mark_a_revision_as_changed() {
    let project = TestStacks::with_default_config();
    project.stack(
        "orgs/acme/dev.yaml",
        "vars: {tenant: acme, environment: ue2, stage: dev}\ncomponents:\n  terraform:\n    vpc:\n      vars: {ratio: .nan}\n",
    );
    init_repo(project.root());
    let first = commit_all(project.root(), "initial");
    assert!(detect(&project, &first, Some(&first)).unwrap().is_empty());
}

#[test]
fn vars_change_reports_component_and_dependents_in_order() {
    let (project, first) = repo();
    project.stack("orgs/acme/dev.yaml", &STACK.replace("10.0.0.0/16", "10.1.0.0/16"));
    let second = commit_all(project.root(), "widen vpc");

    let entries = detect(&project, &first, Some(&second)).unwrap();
    assert_eq!(
        summary(&entries),
        vec![
            entry("vpc", "stack.vars", false),
            entry("eks", "dependent", true),
            entry("app", "dependent", true),
        ]
    );
    assert!(entries.iter().all(|e| e.stack == "acme-ue2-dev"));
    assert!(entries.iter().all(|e| e.component_type == ComponentType::Terraform));
}

#[test]
fn detection_is_deterministic() {
    let (project, first) = repo();
    project.stack("orgs/acme/dev.yaml", &STACK.replace("size: 3", "size: 5"));
    let second = commit_all(project.root(), "grow eks");

    let once = detect(&project, &first, Some(&second)).unwrap();
    let twice = detect(&project, &first, Some(&second)).unwrap();
    assert_eq!(once, twice);
    assert_eq!(
        summary(&once),
        vec![entry("eks", "stack.vars", false), entry("app", "dependent", true)]
    );
}

#[test]
fn working_tree_is_compared_without_target() {
    let (project, first) = repo();
    project.stack("orgs/acme/dev.yaml", &STACK.replace("example.com", "example.org"));

    let entries = detect(&project, &first, None).unwrap();
    assert_eq!(summary(&entries), vec![entry("dns", "stack.vars", false)]);
}

#[test]
fn component_folder_change_is_reported() {
    let (project, first) = repo();
    project.file("components/terraform/dns/main.tf", "# dns v2\n");
    let second = commit_all(project.root(), "touch dns code");

    let entries = detect(&project, &first, Some(&second)).unwrap();
    assert_eq!(summary(&entries), vec![entry("dns", "component", false)]);
}

#[test]
fn added_and_removed_components() {
    let (project, first) = repo();
    let changed = STACK
        .replace("    dns:\n      vars: {zone: example.com}\n", "")
        .replace("    base:\n", "    cdn:\n      vars: {ttl: 60}\n    base:\n");
    project.stack("orgs/acme/dev.yaml", &changed);
    let second = commit_all(project.root(), "swap dns for cdn");

    let entries = detect(&project, &first, Some(&second)).unwrap();
    assert_eq!(
        summary(&entries),
        vec![entry("cdn", "added", false), entry("dns", "removed", false)]
    );
}

#[test]
fn abstract_components_are_not_reported() {
    let (project, first) = repo();
    project.stack("orgs/acme/dev.yaml", &STACK.replace("shared: true", "shared: false"));
    let second = commit_all(project.root(), "change abstract base");

    assert!(detect(&project, &first, Some(&second)).unwrap().is_empty());
}

#[test]
fn depends_on_file_is_reported() {
    let (project, first) = repo();
    let with_file = STACK.replace(
        "    dns:\n      vars: {zone: example.com}\n",
        "    dns:\n      vars: {zone: example.com}\n      settings:\n        depends_on:\n          - file: config/zones.txt\n",
    );
    project
        .stack("orgs/acme/dev.yaml", &with_file)
        .file("config/zones.txt", "example.com\n");
    let second = commit_all(project.root(), "declare zone file");
    project.file("config/zones.txt", "example.com\nexample.org\n");
    let third = commit_all(project.root(), "add zone");

    let entries = detect(&project, &second, Some(&third)).unwrap();
    assert_eq!(summary(&entries), vec![entry("dns", "file", false)]);
}

#[test]
fn unknown_revision_fails_detection() {
    let (project, first) = repo();
    let err = detect(&project, "no-such-revision", Some(&first)).unwrap_err();
    match err {
        Error::AffectedDetection { revision, .. } => assert_eq!(revision, "no-such-revision"),
        other => panic!("unexpected error: {other}"),
    }
}
