//! Error types for strata-core

use std::fmt;

/// Result type for strata-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by an external collaborator (shell, store, output provider).
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// One manifest that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub manifest: String,
    pub message: String,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.manifest, self.message)
    }
}

/// Errors that can occur while resolving stack configuration
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An import (or explicitly requested manifest) does not exist
    #[error("Manifest '{path}' imported from '{importer}' does not exist")]
    ManifestNotFound { path: String, importer: String },

    /// Discovery produced no manifests at all
    #[error("No stack manifests found for {target} in the paths {patterns:?}")]
    NoManifestsFound {
        target: String,
        patterns: Vec<String>,
    },

    /// A manifest is not valid YAML or has a malformed section
    #[error("Invalid manifest '{path}': {message}")]
    ManifestParse { path: String, message: String },

    #[error("Import cycle detected: {}", .cycle.join(" -> "))]
    ImportCycle { cycle: Vec<String> },

    #[error(
        "Import depth exceeds the maximum of {max_depth} at '{path}' (chain: {})",
        .chain.join(" -> ")
    )]
    ImportDepthExceeded {
        path: String,
        max_depth: usize,
        chain: Vec<String>,
    },

    /// Two values of incompatible shape meet at the same key
    #[error("Cannot merge {incoming} into {existing} at '{path}'")]
    MergeTypeMismatch {
        path: String,
        existing: &'static str,
        incoming: &'static str,
    },

    #[error(
        "The stack name pattern '{pattern}' specifies '{token}', but the stack '{stack}' does not have a {token} defined in the stack file '{file}'"
    )]
    MissingContextToken {
        token: String,
        pattern: String,
        stack: String,
        file: String,
    },

    #[error("Inheritance cycle for component '{component}': {}", .cycle.join(" -> "))]
    InheritanceCycle {
        component: String,
        cycle: Vec<String>,
    },

    #[error("Component '{component}' inherits from '{base}', which is not a {component_type} component of this stack")]
    BaseComponentNotFound {
        component: String,
        base: String,
        component_type: String,
    },

    #[error("Component '{component}' not found in stack '{stack}'")]
    ComponentNotFound { component: String, stack: String },

    #[error("Invalid function call '{raw}': {message}")]
    FunctionCallSyntax { raw: String, message: String },

    #[error("Failed to evaluate '{function}' for component '{component}' in stack '{stack}': {source}")]
    FunctionEvaluation {
        function: String,
        stack: String,
        component: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("Template error: {message}")]
    Template { message: String },

    /// Materializing or diffing a revision failed
    #[error("Affected detection failed for revision '{revision}': {source}")]
    AffectedDetection {
        revision: String,
        #[source]
        source: strata_git::Error,
    },

    #[error("Dependency cycle between components: {}", .components.join(", "))]
    DependencyCycle { components: Vec<String> },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to parse configuration at {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("Resolution cancelled")]
    Cancelled,

    /// Adds manifest context to an error raised while merging it
    #[error("In manifest '{manifest}': {source}")]
    InManifest {
        manifest: String,
        #[source]
        source: Box<Error>,
    },

    /// Adds component context to an error raised while resolving it
    #[error("Component '{component}' in manifest '{manifest}': {source}")]
    InComponent {
        component: String,
        manifest: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{} manifest(s) failed validation:\n{}", .failures.len(), format_failures(.failures))]
    Validation { failures: Vec<ValidationFailure> },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from strata-fs
    #[error(transparent)]
    Fs(#[from] strata_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn format_failures(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  - {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Error {
    /// Strip the manifest/component context wrappers.
    pub fn innermost(&self) -> &Error {
        match self {
            Error::InManifest { source, .. } | Error::InComponent { source, .. } => {
                source.innermost()
            }
            other => other,
        }
    }

    pub(crate) fn in_manifest(self, manifest: impl Into<String>) -> Self {
        Error::InManifest {
            manifest: manifest.into(),
            source: Box::new(self),
        }
    }

    pub(crate) fn in_component(self, component: impl Into<String>, manifest: impl Into<String>) -> Self {
        Error::InComponent {
            component: component.into(),
            manifest: manifest.into(),
            source: Box::new(self),
        }
    }
}
