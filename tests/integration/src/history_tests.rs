//! Affected-component detection across a multi-stack git history

use std::sync::Arc;

use pretty_assertions::assert_eq;
use strata_core::{AffectedDetector, AffectedEntry, Collaborators, ConfigLoader, MapEnv, StrataConfig};
use strata_git::GitRevisions;
use strata_test_utils::git::{commit_all, init_repo};
use strata_test_utils::stacks::TestStacks;

const CATALOG: &str = r#"
components:
  terraform:
    vpc:
      vars: {nat_gateways: 1}
"#;

const DEV: &str = r#"
import: [catalog/vpc]
vars: {tenant: acme, environment: ue2, stage: dev}
components:
  terraform:
    vpc:
      vars: {cidr: 10.0.0.0/16}
"#;

const PROD: &str = r#"
import: [catalog/vpc]
vars: {tenant: acme, environment: ue2, stage: prod}
components:
  terraform:
    vpc:
      vars: {cidr: 10.1.0.0/16}
    monitoring:
      vars: {retention: 30}
      settings:
        depends_on:
          - component: vpc
            stack: acme-ue2-dev
"#;

fn history() -> (TestStacks, String) {
    let project = TestStacks::with_default_config();
    project
        .stack("catalog/vpc.yaml", CATALOG)
        .stack("orgs/acme/dev.yaml", DEV)
        .stack("orgs/acme/prod.yaml", PROD)
        .file("components/terraform/vpc/main.tf", "# vpc\n")
        .file("components/terraform/monitoring/main.tf", "# monitoring\n");
    init_repo(project.root());
    let first = commit_all(project.root(), "initial");
    (project, first)
}

fn config(project: &TestStacks) -> StrataConfig {
    ConfigLoader::new(project.root())
        .with_global_config_dir(project.root().join(".no-global-config"))
        .with_env(Arc::new(MapEnv::new()))
        .load()
        .unwrap()
}

fn affected(project: &TestStacks, base: &str, target: Option<&str>) -> Vec<(String, String, String)> {
    let revisions = GitRevisions::open(project.root()).unwrap();
    let collaborators = Collaborators::default().with_env(Arc::new(MapEnv::new()));
    AffectedDetector::new(&config(project), &revisions, collaborators)
        .detect(base, target)
        .unwrap()
        .iter()
        .map(|AffectedEntry { stack, component, reason, .. }| (stack.clone(), component.clone(), reason.to_string()))
        .collect()
}

fn row(stack: &str, component: &str, reason: &str) -> (String, String, String) {
    (stack.to_string(), component.to_string(), reason.to_string())
}

#[test]
fn catalog_change_reaches_every_importing_stack() {
    let (project, first) = history();
    project.stack("catalog/vpc.yaml", &CATALOG.replace("nat_gateways: 1", "nat_gateways: 2"));
    let second = commit_all(project.root(), "more nat gateways");

    assert_eq!(
        affected(&project, &first, Some(&second)),
        vec![
            row("acme-ue2-dev", "vpc", "stack.vars"),
            row("acme-ue2-prod", "monitoring", "dependent"),
            row("acme-ue2-prod", "vpc", "stack.vars"),
        ]
    );
}

#[test]
fn cross_stack_dependents_follow_their_dependency() {
    let (project, first) = history();
    project.stack("orgs/acme/dev.yaml", &DEV.replace("10.0.0.0/16", "10.2.0.0/16"));
    let second = commit_all(project.root(), "move dev vpc");

    assert_eq!(
        affected(&project, &first, Some(&second)),
        vec![
            row("acme-ue2-dev", "vpc", "stack.vars"),
            row("acme-ue2-prod", "monitoring", "dependent"),
        ]
    );
}

#[test]
fn code_change_affects_every_stack_using_the_folder() {
    let (project, first) = history();
    project.file("components/terraform/vpc/main.tf", "# vpc v2\n");
    let second = commit_all(project.root(), "vpc module change");

    assert_eq!(
        affected(&project, &first, Some(&second)),
        vec![
            row("acme-ue2-dev", "vpc", "component"),
            row("acme-ue2-prod", "monitoring", "dependent"),
            row("acme-ue2-prod", "vpc", "component"),
        ]
    );
}

#[test]
fn history_over_several_commits() {
    let (project, first) = history();
    project.stack("orgs/acme/prod.yaml", &PROD.replace("retention: 30", "retention: 90"));
    commit_all(project.root(), "longer retention");
    project.stack("orgs/acme/prod.yaml", &PROD.replace("retention: 30", "retention: 90").replace("10.1.0.0/16", "10.3.0.0/16"));
    let third = commit_all(project.root(), "move prod vpc");

    assert_eq!(
        affected(&project, &first, Some(&third)),
        vec![
            row("acme-ue2-prod", "monitoring", "stack.vars"),
            row("acme-ue2-prod", "vpc", "stack.vars"),
        ]
    );
}

#[test]
fn uncommitted_edits_are_compared_with_the_working_tree() {
    let (project, first) = history();
    project.stack("orgs/acme/prod.yaml", &PROD.replace("retention: 30", "retention: 7"));

    assert_eq!(
        affected(&project, &first, None),
        vec![row("acme-ue2-prod", "monitoring", "stack.vars")]
    );
    assert!(affected(&project, "HEAD", Some("HEAD")).is_empty());
}
