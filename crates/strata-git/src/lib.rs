//! Git abstraction for Strata
//!
//! The affected-component detector needs two things from version control:
//! the manifest tree as it was at a revision, and the list of files that
//! changed between two revisions. [`RevisionProvider`] is that seam;
//! [`GitRevisions`] implements it with `git2`.

pub mod error;
pub mod provider;
pub mod revisions;

pub use error::{Error, Result};
pub use provider::RevisionProvider;
pub use revisions::GitRevisions;
