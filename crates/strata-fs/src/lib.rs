//! Filesystem abstraction for Strata
//!
//! Provides normalized path handling, text I/O with path-carrying errors and
//! glob patterns used to locate stack manifests.

pub mod error;
pub mod glob;
pub mod io;
pub mod path;

pub use error::{Error, Result};
pub use glob::{GlobPattern, has_glob_meta};
pub use path::NormalizedPath;
