//! Stack configuration resolution engine for Strata
//!
//! Turns a tree of YAML stack manifests into the final configuration of
//! every component in every stack:
//!
//! - **Manifest discovery**: include/exclude globs under the stacks directory
//! - **Imports**: recursive, cycle-checked, optionally templated
//! - **Deep merge**: maps merge, scalars replace, lists follow a strategy
//! - **Inheritance**: stack-wide, type-wide, base components, own sections
//! - **Stack naming**: name templates, token patterns, or manifest paths
//! - **Functions**: `!exec`, `!store`, `!terraform.output` and friends
//! - **Affected detection**: diff two revisions and order the changes
//!
//! # Architecture
//!
//! ```text
//!                     strata-cli
//!                         |
//!                    strata-core
//!                    /         \
//!              strata-fs    strata-git
//! ```
//!
//! # Example
//!
//! ```no_run
//! use strata_core::{Collaborators, ConfigLoader, ResolveFilter, Resolver, Result};
//!
//! fn example() -> Result<()> {
//!     let config = ConfigLoader::new(".").load()?;
//!     let collaborators = Collaborators::from_config(&config)?;
//!     let resolver = Resolver::new(config, collaborators);
//!     let stacks = resolver.resolve(&ResolveFilter::default().section("vars"))?;
//!     println!("{}", serde_yaml::to_string(&stacks)?);
//!     Ok(())
//! }
//! ```

pub mod affected;
pub mod cancel;
pub mod component;
pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod functions;
pub mod inheritance;
pub mod manifest;
pub mod merge;
pub mod resolve;
pub mod template;
pub mod validate;
pub mod value;

pub use affected::{AffectedDetector, AffectedEntry, ChangeReason};
pub use cancel::Cancellation;
pub use component::{ComponentConfig, ComponentType};
pub use config::{ConfigLoader, ConfigOverrides, StrataConfig};
pub use context::{Context, StackNaming};
pub use env::{EnvLookup, MapEnv, ProcessEnv};
pub use error::{Error, Result, ValidationFailure};
pub use functions::{Collaborators, FunctionCache};
pub use inheritance::{DependencyType, InheritanceChain, InheritanceResolver, ProvenanceEntry};
pub use manifest::{ManifestFile, ManifestLocator};
pub use merge::{ListMergeStrategy, MergeOptions, merge};
pub use resolve::{ResolveFilter, ResolveOptions, ResolvedStacks, Resolver};
pub use template::{PathTemplateEngine, TemplateEngine};
pub use validate::ValidationReport;
pub use value::{Mapping, Value};
