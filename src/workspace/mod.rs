//! Workspace discovery and the package graph boundary
//!
//! The package list and its topological order come from an external tool.
//! Everything downstream relies on that order: a package always appears
//! after every internal package it depends on.

pub mod lerna;
pub mod manifest;

pub use lerna::LernaGraph;
pub use manifest::PackageManifest;

use crate::error::TarmacResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// One workspace package as reported by the graph provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Package name from its manifest
    pub name: String,
    /// Absolute package directory
    pub location: PathBuf,
    /// Declared dependency names (internal and external)
    pub dependency_names: Vec<String>,
    /// Whether the package defines a build script
    pub has_build_step: bool,
}

/// Source of the workspace package list
#[async_trait]
pub trait PackageGraph: Send + Sync {
    /// All packages, dependencies before dependents
    async fn packages(&self) -> TarmacResult<Vec<PackageDescriptor>>;
}

/// Build a command that runs from the workspace root and prefers
/// binaries installed in `<root>/node_modules/.bin`.
pub fn local_command(root: &Path, argv: &[String]) -> Option<Command> {
    let (program, args) = argv.split_first()?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(root);

    let mut paths = vec![root.join("node_modules").join(".bin")];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    if let Ok(joined) = std::env::join_paths(paths) {
        cmd.env("PATH", joined);
    }
    Some(cmd)
}

/// Render a command line for messages
pub fn display_command(argv: &[String]) -> String {
    argv.iter()
        .map(|a| {
            if a.contains(' ') {
                format!("{:?}", a)
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
