#![allow(dead_code)]

use std::sync::Arc;

use strata_core::{Collaborators, ConfigLoader, MapEnv, Resolver, StrataConfig};
use strata_test_utils::stacks::TestStacks;

/// Load the project's `strata.yaml` without touching the user's config
/// directory or the process environment.
pub fn load_config(project: &TestStacks) -> StrataConfig {
    ConfigLoader::new(project.root())
        .with_global_config_dir(project.root().join(".no-global-config"))
        .with_env(Arc::new(MapEnv::new()))
        .load()
        .unwrap()
}

pub fn collaborators() -> Collaborators {
    Collaborators::default().with_env(Arc::new(MapEnv::new()))
}

pub fn resolver(project: &TestStacks) -> Resolver {
    Resolver::new(load_config(project), collaborators())
}

/// A dev stack for tenant `acme` in `ue2`, named `acme-ue2-dev` by the
/// default config.
pub const DEV_STACK: &str = r#"
import:
  - catalog/vpc
vars:
  tenant: acme
  environment: ue2
  stage: dev
terraform:
  vars:
    x: 3
  backend_type: s3
  backend:
    s3:
      bucket: acme-dev-state
components:
  terraform:
    vpc:
      metadata:
        inherits: [vpc-defaults]
      vars:
        x: 1
        cidr: 10.0.0.0/16
"#;

/// Catalog entry imported by [`DEV_STACK`].
pub const VPC_CATALOG: &str = r#"
components:
  terraform:
    vpc-defaults:
      metadata:
        type: abstract
      vars:
        x: 2
        nat_gateways: 1
        cidr: 10.99.0.0/16
"#;

pub fn dev_project() -> TestStacks {
    let project = TestStacks::with_default_config();
    project
        .stack("catalog/vpc.yaml", VPC_CATALOG)
        .stack("orgs/acme/dev.yaml", DEV_STACK);
    project
}
