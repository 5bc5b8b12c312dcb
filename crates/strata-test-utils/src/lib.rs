//! Shared test utilities for the Strata workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`git`]: git repository fixtures with real history
//! - [`stacks`]: [`stacks::TestStacks`] builder for manifest trees

pub mod git;
pub mod stacks;
