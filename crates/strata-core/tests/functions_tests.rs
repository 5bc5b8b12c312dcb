//! Tests for custom function evaluation

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use rstest::rstest;
use strata_core::error::CollaboratorError;
use strata_core::functions::{
    ComponentLookup, EvaluationScope, FunctionEvaluator, OutputProvider, OutputTarget, ShellExecutor,
    ShellOutput, ShellRequest, StaticStore, Store,
};
use strata_core::{
    Cancellation, Collaborators, ComponentType, Error, FunctionCache, MapEnv, Mapping, ResolveFilter,
    ResolveOptions, Resolver, Value,
};
use strata_fs::NormalizedPath;
use strata_test_utils::stacks::TestStacks;
use tempfile::TempDir;

fn yaml(text: &str) -> Value {
    Value::parse_yaml(text).unwrap()
}

/// Records requests and answers with a fixed output.
struct FakeShell {
    output: ShellOutput,
    requests: Mutex<Vec<ShellRequest>>,
}

impl FakeShell {
    fn new(stdout: &str, status: i32) -> Self {
        Self {
            output: ShellOutput {
                stdout: stdout.to_string(),
                stderr: if status == 0 { String::new() } else { "boom".to_string() },
                status,
            },
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl ShellExecutor for FakeShell {
    fn run(&self, request: &ShellRequest, _cancel: &Cancellation) -> Result<ShellOutput, CollaboratorError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.output.clone())
    }
}

/// Counts calls and returns the same outputs for every target.
#[derive(Default)]
struct CountingOutputs {
    calls: AtomicUsize,
}

impl OutputProvider for CountingOutputs {
    fn outputs(&self, target: &OutputTarget, _cancel: &Cancellation) -> Result<Mapping, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outputs = yaml("vpc_id: vpc-123\nsubnets: [a, b]\nnested: {depth: 2}")
            .as_mapping()
            .cloned()
            .unwrap();
        outputs.insert("workspace".to_string(), Value::from(target.workspace.clone().unwrap_or_default()));
        Ok(outputs)
    }
}

#[derive(Default)]
struct CountingStore {
    calls: AtomicUsize,
}

impl Store for CountingStore {
    fn get(&self, stack: &str, component: &str, key: &str) -> Result<Value, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::from(format!("{stack}/{component}/{key}")))
    }
}

struct FixedLookup;

impl ComponentLookup for FixedLookup {
    fn output_target(&self, component: &str, stack: &str) -> strata_core::Result<Option<OutputTarget>> {
        if component == "missing" {
            return Ok(None);
        }
        Ok(Some(OutputTarget {
            component: component.to_string(),
            component_type: ComponentType::Terraform,
            stack: stack.to_string(),
            folder: NormalizedPath::new("/tmp/components/terraform").join(component),
            workspace: Some(format!("{stack}-ws")),
        }))
    }
}

struct Harness {
    collaborators: Collaborators,
    cache: FunctionCache,
    base: TempDir,
    data: Value,
}

impl Harness {
    fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            cache: FunctionCache::new(),
            base: TempDir::new().unwrap(),
            data: yaml("vars: {name: demo, size: 3, tags: {team: core}}"),
        }
    }

    fn evaluator(&self) -> FunctionEvaluator<'_> {
        FunctionEvaluator::new(
            &self.collaborators,
            &self.cache,
            &FixedLookup,
            NormalizedPath::new(self.base.path()),
        )
    }

    fn scope(&self) -> EvaluationScope<'_> {
        EvaluationScope {
            stack: "acme-ue2-dev",
            component: "app",
            data: &self.data,
        }
    }

    fn eval(&self, raw: &str) -> strata_core::Result<Value> {
        self.evaluator().evaluate(&Value::from(raw), &self.scope())
    }
}

mod dispatch {
    use super::*;
    use pretty_assertions::assert_eq;

    #[rstest]
    #[case("plain string")]
    #[case("!unknown tag stays")]
    #[case("!envy not the env tag")]
    fn non_calls_pass_through(#[case] raw: &str) {
        let harness = Harness::new(Collaborators::default());
        assert_eq!(harness.eval(raw).unwrap(), Value::from(raw));
    }

    #[rstest]
    #[case("!exec")]
    #[case("!store ssm")]
    #[case("!terraform.output vpc")]
    #[case("!env A B C")]
    #[case("!store ssm 'unterminated key")]
    fn malformed_calls_are_syntax_errors(#[case] raw: &str) {
        let harness = Harness::new(Collaborators::default().with_store("ssm", Arc::new(StaticStore::default())));
        let err = harness.eval(raw).unwrap_err();
        assert!(
            matches!(err, Error::FunctionCallSyntax { raw: ref r, .. } if r == raw),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn nested_values_are_rebuilt() {
        let env = MapEnv::new().with("REGION", "us-west-2");
        let harness = Harness::new(Collaborators::default().with_env(Arc::new(env)));
        let input = yaml("region: '!env REGION'\nlist: ['!env REGION', 7]\nmap: {inner: '!env REGION'}");
        let output = harness.evaluator().evaluate(&input, &harness.scope()).unwrap();

        assert_eq!(
            output,
            yaml("region: us-west-2\nlist: [us-west-2, 7]\nmap: {inner: us-west-2}")
        );
        assert_eq!(input.get("region"), Some(&Value::from("!env REGION")));
    }

    #[test]
    fn cancelled_evaluation_fails() {
        let harness = Harness::new(Collaborators::default());
        let cancel = Cancellation::new();
        cancel.cancel();
        let err = harness
            .evaluator()
            .with_cancellation(cancel)
            .evaluate(&Value::from("plain"), &harness.scope())
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}

mod exec {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stdout_is_decoded_as_json() {
        let shell = Arc::new(FakeShell::new("{\"a\": 1}\n", 0));
        let harness = Harness::new(Collaborators::default().with_shell(shell.clone()));

        assert_eq!(harness.eval("!exec echo '{\"a\": 1}'").unwrap(), yaml("a: 1"));

        let requests = shell.requests.lock().unwrap();
        assert_eq!(requests[0].program, "sh");
        assert_eq!(requests[0].args, vec!["-c", "echo '{\"a\": 1}'"]);
        assert_eq!(requests[0].working_dir.as_deref(), Some(harness.base.path()));
    }

    #[test]
    fn plain_stdout_is_trimmed_string() {
        let harness = Harness::new(Collaborators::default().with_shell(Arc::new(FakeShell::new("  hello\n", 0))));
        assert_eq!(harness.eval("!exec echo hello").unwrap(), Value::from("hello"));
    }

    #[test]
    fn non_zero_exit_is_an_evaluation_error() {
        let harness = Harness::new(Collaborators::default().with_shell(Arc::new(FakeShell::new("", 2))));
        let err = harness.eval("!exec false").unwrap_err();
        match err {
            Error::FunctionEvaluation { function, stack, component, source } => {
                assert_eq!(function, "!exec false");
                assert_eq!(stack, "acme-ue2-dev");
                assert_eq!(component, "app");
                assert!(source.to_string().contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lenient_mode_keeps_raw_value() {
        let harness = Harness::new(Collaborators::default().with_shell(Arc::new(FakeShell::new("", 1))));
        let evaluator = harness.evaluator().lenient(true);
        let value = evaluator.evaluate(&Value::from("!exec false"), &harness.scope()).unwrap();

        assert_eq!(value, Value::from("!exec false"));
        let warnings = evaluator.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("acme-ue2-dev/app"));
    }

    #[test]
    fn lenient_mode_does_not_hide_syntax_errors() {
        let harness = Harness::new(Collaborators::default());
        let err = harness
            .evaluator()
            .lenient(true)
            .evaluate(&Value::from("!exec"), &harness.scope())
            .unwrap_err();
        assert!(matches!(err, Error::FunctionCallSyntax { .. }));
    }
}

mod lookups {
    use super::*;
    use pretty_assertions::assert_eq;

    #[rstest]
    #[case("!env REGION", Value::from("us-west-2"))]
    #[case("!env COUNT", Value::Int(3))]
    #[case("!env MISSING fallback", Value::from("fallback"))]
    #[case("!env MISSING", Value::from(""))]
    #[case("!env MISSING 'two words'", Value::from("two words"))]
    fn env_lookup(#[case] raw: &str, #[case] expected: Value) {
        let env = MapEnv::new().with("REGION", "us-west-2").with("COUNT", "3");
        let harness = Harness::new(Collaborators::default().with_env(Arc::new(env)));
        assert_eq!(harness.eval(raw).unwrap(), expected);
    }

    #[test]
    fn store_defaults_to_current_stack() {
        let data = yaml("acme-ue2-dev: {vpc: {id: vpc-dev}}\nacme-ue2-prod: {vpc: {id: vpc-prod}}");
        let store = StaticStore::new(data.as_mapping().cloned().unwrap());
        let harness = Harness::new(Collaborators::default().with_store("ssm", Arc::new(store)));

        assert_eq!(harness.eval("!store ssm vpc id").unwrap(), Value::from("vpc-dev"));
        assert_eq!(harness.eval("!store ssm acme-ue2-prod vpc id").unwrap(), Value::from("vpc-prod"));
    }

    #[test]
    fn store_lookups_are_memoized() {
        let store = Arc::new(CountingStore::default());
        let harness = Harness::new(Collaborators::default().with_store("ssm", store.clone()));

        for _ in 0..3 {
            assert_eq!(harness.eval("!store ssm vpc id").unwrap(), Value::from("acme-ue2-dev/vpc/id"));
        }
        harness.eval("!store ssm vpc name").unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_store_fails() {
        let harness = Harness::new(Collaborators::default());
        assert!(matches!(
            harness.eval("!store vault vpc id").unwrap_err(),
            Error::FunctionEvaluation { .. }
        ));
    }

    #[test]
    fn missing_store_key_fails() {
        let harness = Harness::new(Collaborators::default().with_store("ssm", Arc::new(StaticStore::default())));
        let err = harness.eval("!store ssm vpc id").unwrap_err();
        assert!(err.to_string().contains("key 'id' not found"), "{err}");
    }
}

mod outputs {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn same_component_is_fetched_once() {
        let outputs = Arc::new(CountingOutputs::default());
        let harness = Harness::new(Collaborators::default().with_outputs(outputs.clone()));

        assert_eq!(harness.eval("!terraform.output vpc vpc_id").unwrap(), Value::from("vpc-123"));
        assert_eq!(harness.eval("!terraform.output vpc .nested.depth").unwrap(), Value::Int(2));
        assert_eq!(harness.eval("!terraform.output vpc subnets.1").unwrap(), Value::from("b"));
        assert_eq!(outputs.calls.load(Ordering::SeqCst), 1);

        harness.eval("!terraform.output vpc acme-ue2-prod vpc_id").unwrap();
        assert_eq!(outputs.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn target_workspace_is_passed_to_provider() {
        let harness = Harness::new(Collaborators::default().with_outputs(Arc::new(CountingOutputs::default())));
        assert_eq!(
            harness.eval("!terraform.output vpc workspace").unwrap(),
            Value::from("acme-ue2-dev-ws")
        );
    }

    #[test]
    fn missing_output_fails() {
        let harness = Harness::new(Collaborators::default().with_outputs(Arc::new(CountingOutputs::default())));
        let err = harness.eval("!terraform.output vpc nope").unwrap_err();
        assert!(err.to_string().contains("output 'nope' not found"), "{err}");
    }

    #[test]
    fn missing_component_fails() {
        let outputs = Arc::new(CountingOutputs::default());
        let harness = Harness::new(Collaborators::default().with_outputs(outputs.clone()));
        assert!(matches!(
            harness.eval("!terraform.output missing vpc_id").unwrap_err(),
            Error::FunctionEvaluation { .. }
        ));
        assert_eq!(outputs.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn resolver_fetches_each_component_once_per_pass() {
        let project = TestStacks::with_default_config();
        project.stack(
            "orgs/acme/dev.yaml",
            r#"
vars: {tenant: acme, environment: ue2, stage: dev}
components:
  terraform:
    vpc:
      vars: {cidr: 10.0.0.0/16}
    eks:
      vars:
        vpc_id: '!terraform.output vpc vpc_id'
        subnets: '!terraform.output vpc subnets'
    rds:
      vars:
        vpc_id: '!terraform.output vpc vpc_id'
"#,
        );
        let outputs = Arc::new(CountingOutputs::default());
        let resolver = Resolver::new(
            common::load_config(&project),
            common::collaborators().with_outputs(outputs.clone()),
        );

        let stacks = resolver.resolve(&ResolveFilter::default().section("vars")).unwrap();
        let eks = stacks.get("acme-ue2-dev", ComponentType::Terraform, "eks").unwrap();
        let eks_vars = eks.get("vars").unwrap();
        assert_eq!(eks_vars.get("vpc_id"), Some(&Value::from("vpc-123")));
        assert_eq!(eks_vars.get("subnets"), Some(&yaml("[a, b]")));
        let rds = stacks.get("acme-ue2-dev", ComponentType::Terraform, "rds").unwrap();
        assert_eq!(rds.get("vars").and_then(|v| v.get("vpc_id")), Some(&Value::from("vpc-123")));
        assert_eq!(outputs.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn output_lookup_does_not_repeat_import_warnings() {
        let project = TestStacks::with_default_config();
        project.stack(
            "orgs/acme/dev.yaml",
            "import: [catalog/nope]\nvars: {tenant: acme, environment: ue2, stage: dev}\ncomponents:\n  terraform:\n    vpc: {}\n    app:\n      vars:\n        id: '!terraform.output vpc vpc_id'\n",
        );
        let resolver = Resolver::new(
            common::load_config(&project),
            common::collaborators().with_outputs(Arc::new(CountingOutputs::default())),
        )
        .with_options(ResolveOptions {
            ignore_missing_imports: true,
            ..Default::default()
        });

        resolver.resolve(&ResolveFilter::default()).unwrap();
        let warnings = resolver.take_warnings();
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("catalog/nope"));
    }

    #[test]
    fn separate_resolvers_do_not_share_results() {
        let project = TestStacks::with_default_config();
        project.stack(
            "orgs/acme/dev.yaml",
            "vars: {tenant: acme, environment: ue2, stage: dev}\ncomponents:\n  terraform:\n    vpc: {}\n    app:\n      vars:\n        id: '!terraform.output vpc vpc_id'\n",
        );
        let outputs = Arc::new(CountingOutputs::default());
        for _ in 0..2 {
            let resolver = Resolver::new(
                common::load_config(&project),
                common::collaborators().with_outputs(outputs.clone()),
            );
            resolver.resolve(&ResolveFilter::default()).unwrap();
        }
        assert_eq!(outputs.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn functions_can_be_left_unevaluated() {
        let project = TestStacks::with_default_config();
        project.stack(
            "orgs/acme/dev.yaml",
            "vars: {tenant: acme, environment: ue2, stage: dev}\ncomponents:\n  terraform:\n    app:\n      vars:\n        id: '!terraform.output vpc vpc_id'\n",
        );
        let resolver = common::resolver(&project).with_options(ResolveOptions {
            process_functions: false,
            ..Default::default()
        });
        let app = resolver.describe_component("app", "acme-ue2-dev").unwrap();
        assert_eq!(app.vars.get("id"), Some(&Value::from("!terraform.output vpc vpc_id")));
    }
}

mod templates_and_includes {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn template_renders_against_component() {
        let harness = Harness::new(Collaborators::default());
        assert_eq!(harness.eval("!template {{ .vars.name }}-svc").unwrap(), Value::from("demo-svc"));
        assert_eq!(harness.eval("!template {{ .vars.tags }}").unwrap(), yaml("team: core"));
        assert_eq!(harness.eval("!template {{ .vars.size }}").unwrap(), Value::Int(3));
    }

    #[test]
    fn template_with_missing_field_fails() {
        let harness = Harness::new(Collaborators::default());
        assert!(matches!(
            harness.eval("!template {{ .vars.nope }}").unwrap_err(),
            Error::FunctionEvaluation { .. }
        ));
    }

    #[rstest]
    #[case("config/data.yaml", "size: 3\nzones: [a, b]\n", "size: 3\nzones: [a, b]")]
    #[case("config/data.json", "{\"size\": 3}", "size: 3")]
    #[case("config/motd.txt", "hello", "hello")]
    fn include_reads_relative_to_base(#[case] path: &str, #[case] content: &str, #[case] expected: &str) {
        let harness = Harness::new(Collaborators::default());
        let file = harness.base.path().join(path);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, content).unwrap();

        assert_eq!(harness.eval(&format!("!include {path}")).unwrap(), yaml(expected));
    }

    #[test]
    fn include_of_missing_file_fails() {
        let harness = Harness::new(Collaborators::default());
        assert!(matches!(
            harness.eval("!include nope.yaml").unwrap_err(),
            Error::FunctionEvaluation { .. }
        ));
    }
}
