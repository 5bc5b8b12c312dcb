//! End-to-end resolution of a multi-stack project
//!
//! Exercises config loading, glob and templated imports, inheritance,
//! naming, every built-in function and provenance in one tree.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use strata_core::error::CollaboratorError;
use strata_core::functions::{OutputProvider, OutputTarget};
use strata_core::{
    Cancellation, Collaborators, ComponentType, ConfigLoader, DependencyType, MapEnv, Mapping, ResolveFilter,
    ResolvedStacks, Resolver, StrataConfig, Value,
};
use strata_test_utils::stacks::TestStacks;

const CONFIG: &str = r#"
stacks:
  base_path: stacks
  included_paths: ["orgs/**/*"]
  excluded_paths: ["**/_defaults.yaml"]
  name_pattern: "{tenant}-{environment}-{stage}"
components:
  terraform:
    base_path: components/terraform
  helmfile:
    base_path: components/helmfile
settings:
  list_merge_strategy: replace
stores:
  params:
    type: static
    options:
      data:
        acme-ue2-dev:
          vpc: {account: "111111111111"}
        acme-ue2-prod:
          vpc: {account: "222222222222"}
"#;

const REGION_MIXIN: &str = r#"
vars:
  region: "{{ .region }}"
"#;

const VPC_DEFAULTS: &str = r#"
components:
  terraform:
    vpc-defaults:
      metadata: {type: abstract}
      vars:
        nat_gateways: 1
        subnets: [a, b]
"#;

const VPC_FLOW_LOGS: &str = r#"
components:
  terraform:
    vpc-defaults:
      vars:
        flow_logs: true
"#;

const ORG_DEFAULTS: &str = r#"
vars:
  tenant: acme
  environment: ue2
settings:
  owner: platform
"#;

fn stage(stage: &str, cidr: &str) -> String {
    format!(
        r#"
import:
  - orgs/acme/_defaults
  - catalog/vpc/*
  - path: catalog/mixins/region
    context: {{region: us-east-2}}
vars:
  stage: {stage}
components:
  terraform:
    vpc:
      metadata:
        inherits: [vpc-defaults]
      vars:
        cidr: {cidr}
        account: "!store params vpc account"
        deployer: "!env DEPLOYER ci"
    dns:
      vars:
        vpc_id: "!terraform.output vpc vpc_id"
  helmfile:
    ingress:
      vars:
        host: "!template {{{{ .vars.stage }}}}.example.com"
"#
    )
}

fn project() -> TestStacks {
    let project = TestStacks::new();
    project
        .config(CONFIG)
        .stack("catalog/mixins/region.yaml", REGION_MIXIN)
        .stack("catalog/vpc/defaults.yaml", VPC_DEFAULTS)
        .stack("catalog/vpc/flow-logs.yaml", VPC_FLOW_LOGS)
        .stack("orgs/acme/_defaults.yaml", ORG_DEFAULTS)
        .stack("orgs/acme/ue2/dev.yaml", &stage("dev", "10.0.0.0/16"))
        .stack("orgs/acme/ue2/prod.yaml", &stage("prod", "10.1.0.0/16"));
    project
}

/// Outputs derived from the target, counting fetches.
#[derive(Default)]
struct FakeOutputs {
    calls: AtomicUsize,
}

impl OutputProvider for FakeOutputs {
    fn outputs(&self, target: &OutputTarget, _cancel: &Cancellation) -> Result<Mapping, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outputs = Mapping::new();
        outputs.insert(
            "vpc_id".to_string(),
            Value::from(format!("vpc-{}", target.workspace.clone().unwrap_or_default())),
        );
        Ok(outputs)
    }
}

fn load_config(project: &TestStacks) -> StrataConfig {
    ConfigLoader::new(project.root())
        .with_global_config_dir(project.root().join(".no-global-config"))
        .with_env(Arc::new(MapEnv::new()))
        .load()
        .unwrap()
}

fn resolver(project: &TestStacks, outputs: Arc<FakeOutputs>) -> Resolver {
    let config = load_config(project);
    let collaborators = Collaborators::from_config(&config)
        .unwrap()
        .with_env(Arc::new(MapEnv::new().with("DEPLOYER", "alice")))
        .with_outputs(outputs);
    Resolver::new(config, collaborators)
}

fn field<'a>(stacks: &'a ResolvedStacks, stack: &str, ty: ComponentType, component: &str, path: &[&str]) -> Value {
    let sections = stacks
        .get(stack, ty, component)
        .unwrap_or_else(|| panic!("{stack}/{component} missing"));
    Value::Mapping(sections.clone())
        .get_path(path)
        .cloned()
        .unwrap_or_else(|| panic!("{path:?} missing in {stack}/{component}"))
}

#[test]
fn resolves_every_stack_and_component() {
    let project = project();
    let stacks = resolver(&project, Arc::default()).resolve(&ResolveFilter::default()).unwrap();

    assert_eq!(stacks.stack_names().collect::<Vec<_>>(), vec!["acme-ue2-dev", "acme-ue2-prod"]);
    // vpc, vpc-defaults, dns and ingress in each stack
    assert_eq!(stacks.iter().count(), 8);
    let base = field(&stacks, "acme-ue2-dev", ComponentType::Terraform, "vpc-defaults", &["metadata", "type"]);
    assert_eq!(base, Value::from("abstract"));
}

#[test]
fn inherited_and_imported_values_are_merged() {
    let project = project();
    let stacks = resolver(&project, Arc::default()).resolve(&ResolveFilter::default()).unwrap();
    let vpc = |path: &[&str]| field(&stacks, "acme-ue2-prod", ComponentType::Terraform, "vpc", path);

    assert_eq!(vpc(&["vars", "cidr"]), Value::from("10.1.0.0/16"));
    assert_eq!(vpc(&["vars", "nat_gateways"]), Value::Int(1));
    assert_eq!(vpc(&["vars", "flow_logs"]), Value::Bool(true));
    assert_eq!(vpc(&["vars", "region"]), Value::from("us-east-2"));
    assert_eq!(vpc(&["vars", "tenant"]), Value::from("acme"));
    assert_eq!(vpc(&["settings", "owner"]), Value::from("platform"));
    assert_eq!(vpc(&["workspace"]), Value::from("acme-ue2-prod"));
}

#[test]
fn functions_are_evaluated_per_stack() {
    let project = project();
    let outputs = Arc::new(FakeOutputs::default());
    let stacks = resolver(&project, Arc::clone(&outputs))
        .resolve(&ResolveFilter::default())
        .unwrap();

    for (stack, account) in [("acme-ue2-dev", "111111111111"), ("acme-ue2-prod", "222222222222")] {
        let vpc = |path: &[&str]| field(&stacks, stack, ComponentType::Terraform, "vpc", path);
        assert_eq!(vpc(&["vars", "account"]), Value::from(account));
        assert_eq!(vpc(&["vars", "deployer"]), Value::from("alice"));

        let dns = field(&stacks, stack, ComponentType::Terraform, "dns", &["vars", "vpc_id"]);
        assert_eq!(dns, Value::from(format!("vpc-{stack}")));
    }

    let host = field(&stacks, "acme-ue2-dev", ComponentType::Helmfile, "ingress", &["vars", "host"]);
    assert_eq!(host, Value::from("dev.example.com"));
    assert_eq!(outputs.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn helmfile_components_have_no_workspace() {
    let project = project();
    let stacks = resolver(&project, Arc::default()).resolve(&ResolveFilter::default()).unwrap();
    let ingress = stacks.get("acme-ue2-dev", ComponentType::Helmfile, "ingress").unwrap();
    assert!(!ingress.contains_key("workspace"));
}

#[test]
fn resolution_is_a_fixed_point() {
    let project = project();
    let once = resolver(&project, Arc::default()).resolve(&ResolveFilter::default()).unwrap();
    let twice = resolver(&project, Arc::default()).resolve(&ResolveFilter::default()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn sources_trace_catalog_and_stack_contributions() {
    let project = project();
    let entries = resolver(&project, Arc::default())
        .sources("vpc", "acme-ue2-dev", "vars", "nat_gateways")
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file, "catalog/vpc/defaults.yaml");
    assert_eq!(entries[0].dependency, DependencyType::Import);
    assert_eq!(entries[0].value, Value::Int(1));

    let tenant = resolver(&project, Arc::default())
        .sources("vpc", "acme-ue2-dev", "vars", "tenant")
        .unwrap();
    assert_eq!(
        tenant.iter().map(|e| e.file.as_str()).collect::<Vec<_>>(),
        vec!["orgs/acme/_defaults.yaml"]
    );
}

#[test]
fn validation_covers_the_whole_tree() {
    let project = project();
    let report = resolver(&project, Arc::default()).validate_stacks().unwrap();
    assert_eq!(report.manifests, 2);
    assert_eq!(report.components, 8);
}
