//! External collaborators used by functions
//!
//! Functions reach outside the manifest tree: a shell, a key/value store,
//! the outputs of provisioned components, the environment. Each is a trait
//! so tests and embedders can substitute their own implementation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use strata_fs::NormalizedPath;

use crate::Result;
use crate::cancel::Cancellation;
use crate::component::ComponentType;
use crate::config::StrataConfig;
use crate::env::{EnvLookup, ProcessEnv};
use crate::error::CollaboratorError;
use crate::template::{PathTemplateEngine, TemplateEngine};
use crate::value::{Mapping, Value};

use super::outputs::CommandOutputs;
use super::shell::TokioShell;
use super::store::StoreRegistry;

/// A process to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellRequest {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl ShellRequest {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A command line run through `sh -c`.
    pub fn shell(command: &str) -> Self {
        Self::new("sh", ["-c", command])
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }
}

/// What a finished process produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; -1 when the process was killed by a signal.
    pub status: i32,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

pub trait ShellExecutor: Send + Sync {
    fn run(&self, request: &ShellRequest, cancel: &Cancellation) -> std::result::Result<ShellOutput, CollaboratorError>;
}

pub trait Store: Send + Sync {
    fn get(&self, stack: &str, component: &str, key: &str) -> std::result::Result<Value, CollaboratorError>;
}

/// A provisioned component whose outputs are requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub component: String,
    pub component_type: ComponentType,
    pub stack: String,
    /// Absolute path of the component's code.
    pub folder: NormalizedPath,
    pub workspace: Option<String>,
}

pub trait OutputProvider: Send + Sync {
    /// All outputs of the target, by name.
    fn outputs(&self, target: &OutputTarget, cancel: &Cancellation) -> std::result::Result<Mapping, CollaboratorError>;
}

/// Finds other components for `!terraform.output`.
pub trait ComponentLookup {
    fn output_target(&self, component: &str, stack: &str) -> Result<Option<OutputTarget>>;
}

/// The set of collaborators handed to the evaluator.
#[derive(Clone)]
pub struct Collaborators {
    pub shell: Arc<dyn ShellExecutor>,
    pub stores: StoreRegistry,
    pub outputs: Arc<dyn OutputProvider>,
    pub env: Arc<dyn EnvLookup>,
    pub templates: Arc<dyn TemplateEngine>,
}

impl Default for Collaborators {
    fn default() -> Self {
        let shell: Arc<dyn ShellExecutor> = Arc::new(TokioShell::new());
        Self {
            outputs: Arc::new(CommandOutputs::new(Arc::clone(&shell))),
            shell,
            stores: StoreRegistry::new(),
            env: Arc::new(ProcessEnv),
            templates: Arc::new(PathTemplateEngine),
        }
    }
}

impl Collaborators {
    /// Defaults with the stores declared in configuration.
    pub fn from_config(config: &StrataConfig) -> Result<Self> {
        Ok(Self {
            stores: StoreRegistry::from_config(&config.stores)?,
            ..Self::default()
        })
    }

    pub fn with_shell(mut self, shell: Arc<dyn ShellExecutor>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_outputs(mut self, outputs: Arc<dyn OutputProvider>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_env(mut self, env: Arc<dyn EnvLookup>) -> Self {
        self.env = env;
        self
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateEngine>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_store(mut self, alias: impl Into<String>, store: Arc<dyn Store>) -> Self {
        self.stores.register(alias, store);
        self
    }
}
