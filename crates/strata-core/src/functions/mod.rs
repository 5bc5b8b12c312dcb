//! Custom function evaluation
//!
//! After inheritance, string values starting with a known tag are replaced
//! by the result of a function:
//!
//! | Tag                  | Argument                                   |
//! |----------------------|--------------------------------------------|
//! | `!template`          | template rendered against the component    |
//! | `!exec`              | shell command; stdout is the value         |
//! | `!store`             | `<store> [<stack>] <component> <key>`      |
//! | `!terraform.output`  | `<component> [<stack>] <output>`           |
//! | `!env`               | `<NAME> [<default>]`                       |
//! | `!include`           | file path relative to the base path        |
//!
//! Results that parse as JSON are decoded. Unknown tags are left alone.
//! Store and output lookups are memoized per resolver.

mod cache;
mod call;
mod collaborators;
mod outputs;
mod shell;
mod store;

use std::sync::Mutex;
use std::time::Duration;

use strata_fs::NormalizedPath;

use crate::cancel::Cancellation;
use crate::error::CollaboratorError;
use crate::value::{Mapping, Value};
use crate::{Error, Result};

pub use cache::{FunctionCache, MemoCache};
pub use call::{FunctionCall, split_args};
pub use collaborators::{
    Collaborators, ComponentLookup, OutputProvider, OutputTarget, ShellExecutor, ShellOutput,
    ShellRequest, Store,
};
pub use outputs::CommandOutputs;
pub use shell::TokioShell;
pub use store::{StaticStore, StoreRegistry};

/// The component whose values are being evaluated.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationScope<'s> {
    pub stack: &'s str,
    pub component: &'s str,
    /// Template data for `!template`: the component's sections.
    pub data: &'s Value,
}

/// Evaluates function calls in a value tree.
pub struct FunctionEvaluator<'a> {
    collaborators: &'a Collaborators,
    cache: &'a FunctionCache,
    lookup: &'a dyn ComponentLookup,
    base_path: NormalizedPath,
    cancel: Cancellation,
    timeout: Option<Duration>,
    lenient: bool,
    warnings: Mutex<Vec<String>>,
}

impl<'a> FunctionEvaluator<'a> {
    pub fn new(
        collaborators: &'a Collaborators,
        cache: &'a FunctionCache,
        lookup: &'a dyn ComponentLookup,
        base_path: NormalizedPath,
    ) -> Self {
        Self {
            collaborators,
            cache,
            lookup,
            base_path,
            cancel: Cancellation::new(),
            timeout: None,
            lenient: false,
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Per-call limit for shell and output collaborators.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keep the raw string and record a warning when a collaborator fails.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Warnings recorded in lenient mode so far.
    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.lock().unwrap_or_else(|p| p.into_inner()))
    }

    /// Rebuild `value` with every function call replaced by its result.
    pub fn evaluate(&self, value: &Value, scope: &EvaluationScope<'_>) -> Result<Value> {
        self.cancel.check()?;
        match value {
            Value::String(raw) => self.evaluate_string(raw, scope),
            Value::Sequence(items) => items
                .iter()
                .map(|item| self.evaluate(item, scope))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            Value::Mapping(map) => self.evaluate_mapping(map, scope).map(Value::Mapping),
            other => Ok(other.clone()),
        }
    }

    pub fn evaluate_mapping(&self, map: &Mapping, scope: &EvaluationScope<'_>) -> Result<Mapping> {
        map.iter()
            .map(|(k, v)| self.evaluate(v, scope).map(|v| (k.clone(), v)))
            .collect()
    }

    fn evaluate_string(&self, raw: &str, scope: &EvaluationScope<'_>) -> Result<Value> {
        let Some(call) = FunctionCall::parse(raw)? else {
            return Ok(Value::String(raw.to_string()));
        };
        match self.dispatch(&call, raw, scope) {
            Err(Error::FunctionEvaluation { source, .. }) if self.lenient => {
                tracing::warn!(
                    function = %raw,
                    stack = %scope.stack,
                    component = %scope.component,
                    error = %source,
                    "Function failed, keeping raw value"
                );
                self.warnings
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(format!(
                        "{}/{}: '{raw}' failed: {source}",
                        scope.stack, scope.component
                    ));
                Ok(Value::String(raw.to_string()))
            }
            other => other,
        }
    }

    fn dispatch(&self, call: &FunctionCall, raw: &str, scope: &EvaluationScope<'_>) -> Result<Value> {
        tracing::trace!(tag = call.tag(), stack = %scope.stack, component = %scope.component, "Evaluating function");
        match call {
            FunctionCall::Template(template) => self.template(template, raw, scope),
            FunctionCall::Exec(command) => self.exec(command, raw, scope),
            FunctionCall::Store(args) => self.store(args, raw, scope),
            FunctionCall::TerraformOutput(args) => self.terraform_output(args, raw, scope),
            FunctionCall::Env(args) => self.env(args, raw),
            FunctionCall::Include(path) => self.include(path, raw, scope),
            FunctionCall::Unrecognized(_) => Ok(Value::String(raw.to_string())),
        }
    }

    /// Wrap a collaborator failure, unless the real cause is cancellation.
    fn failure(&self, raw: &str, scope: &EvaluationScope<'_>, source: impl Into<CollaboratorError>) -> Error {
        if self.cancel.is_cancelled() {
            return Error::Cancelled;
        }
        Error::FunctionEvaluation {
            function: raw.to_string(),
            stack: scope.stack.to_string(),
            component: scope.component.to_string(),
            source: source.into(),
        }
    }

    /// Split arguments, reporting quoting errors against the whole call.
    fn arguments(args: &str, raw: &str) -> Result<Vec<String>> {
        split_args(args).map_err(|e| match e {
            Error::FunctionCallSyntax { message, .. } => Error::FunctionCallSyntax {
                raw: raw.to_string(),
                message,
            },
            other => other,
        })
    }

    fn call_cancellation(&self) -> Cancellation {
        self.cancel.child(self.timeout)
    }

    fn template(&self, template: &str, raw: &str, scope: &EvaluationScope<'_>) -> Result<Value> {
        let rendered = self
            .collaborators
            .templates
            .render(template, scope.data)
            .map_err(|e| self.failure(raw, scope, e.to_string()))?;
        Ok(Value::from_json_or_string(&rendered))
    }

    fn exec(&self, command: &str, raw: &str, scope: &EvaluationScope<'_>) -> Result<Value> {
        let request = ShellRequest::shell(command).with_working_dir(self.base_path.to_native());
        let output = self
            .collaborators
            .shell
            .run(&request, &self.call_cancellation())
            .map_err(|e| self.failure(raw, scope, e))?;
        if !output.success() {
            return Err(self.failure(
                raw,
                scope,
                format!("command exited with code {}: {}", output.status, output.stderr.trim()),
            ));
        }
        Ok(Value::from_json_or_string(output.stdout.trim()))
    }

    fn store(&self, args: &str, raw: &str, scope: &EvaluationScope<'_>) -> Result<Value> {
        let args = Self::arguments(args, raw)?;
        let (alias, stack, component, key) = match args.as_slice() {
            [alias, component, key] => (alias, scope.stack, component, key),
            [alias, stack, component, key] => (alias, stack.as_str(), component, key),
            _ => {
                return Err(Error::FunctionCallSyntax {
                    raw: raw.to_string(),
                    message: "expected '!store <store> [<stack>] <component> <key>'".to_string(),
                });
            }
        };
        let store = self
            .collaborators
            .stores
            .get(alias)
            .ok_or_else(|| self.failure(raw, scope, format!("store '{alias}' is not configured")))?;
        let cache_key = (alias.clone(), stack.to_string(), component.clone(), key.clone());
        self.cache.stores.get_or_try_insert_with(cache_key, || {
            tracing::debug!(store = %alias, stack = %stack, component = %component, key = %key, "Reading store");
            store
                .get(stack, component, key)
                .map_err(|e| self.failure(raw, scope, e))
        })
    }

    fn terraform_output(&self, args: &str, raw: &str, scope: &EvaluationScope<'_>) -> Result<Value> {
        let args = Self::arguments(args, raw)?;
        let (component, stack, output) = match args.as_slice() {
            [component, output] => (component, scope.stack, output),
            [component, stack, output] => (component, stack.as_str(), output),
            _ => {
                return Err(Error::FunctionCallSyntax {
                    raw: raw.to_string(),
                    message: "expected '!terraform.output <component> [<stack>] <output>'".to_string(),
                });
            }
        };
        let cache_key = (stack.to_string(), component.clone());
        let outputs = self.cache.outputs.get_or_try_insert_with(cache_key, || {
            let target = self.lookup.output_target(component, stack)?.ok_or_else(|| {
                self.failure(raw, scope, format!("component '{component}' not found in stack '{stack}'"))
            })?;
            self.collaborators
                .outputs
                .outputs(&target, &self.call_cancellation())
                .map(Value::Mapping)
                .map_err(|e| self.failure(raw, scope, e))
        })?;

        let path: Vec<&str> = output.trim_start_matches('.').split('.').collect();
        outputs.get_path(&path).cloned().ok_or_else(|| {
            self.failure(
                raw,
                scope,
                format!("output '{output}' not found for component '{component}' in stack '{stack}'"),
            )
        })
    }

    fn env(&self, args: &str, raw: &str) -> Result<Value> {
        let args = Self::arguments(args, raw)?;
        let (name, default) = match args.as_slice() {
            [name] => (name, None),
            [name, default] => (name, Some(default)),
            _ => {
                return Err(Error::FunctionCallSyntax {
                    raw: raw.to_string(),
                    message: "expected '!env <NAME> [<default>]'".to_string(),
                });
            }
        };
        let value = self
            .collaborators
            .env
            .var(name)
            .or_else(|| default.cloned())
            .unwrap_or_default();
        Ok(Value::from_json_or_string(&value))
    }

    fn include(&self, path: &str, raw: &str, scope: &EvaluationScope<'_>) -> Result<Value> {
        let file = self.base_path.join(path);
        let content = strata_fs::io::read_text(&file).map_err(|e| self.failure(raw, scope, e))?;
        match file.extension() {
            Some("yaml" | "yml") => Value::parse_yaml(&content).map_err(|e| self.failure(raw, scope, e)),
            Some("json") => serde_json::from_str(&content)
                .map(Value::from_json)
                .map_err(|e| self.failure(raw, scope, e)),
            _ => Ok(Value::String(content)),
        }
    }
}
