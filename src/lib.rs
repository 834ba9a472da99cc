//! Tarmac - content-addressed build cache for JavaScript monorepos
//!
//! Derives a cache key per workspace package from its tracked sources, its
//! internal dependencies' keys and a repo-wide hash. Package build output is
//! restored from a local or shared cache when the key is known, built by
//! the workspace's own build runner when it is not, and published for the
//! next run.

pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod install;
pub mod report;
pub mod vcs;
pub mod workspace;

pub use error::{TarmacError, TarmacResult};
