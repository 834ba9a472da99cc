//! Package graph backed by `lerna ls --toposort --json`

use crate::error::{TarmacError, TarmacResult};
use crate::workspace::manifest::PackageManifest;
use crate::workspace::{display_command, local_command, PackageDescriptor, PackageGraph};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::debug;

/// One entry of the list command's JSON output
#[derive(Debug, Deserialize)]
struct ListedPackage {
    name: String,
    location: PathBuf,
}

/// Package graph provided by lerna (or any command printing the same JSON)
pub struct LernaGraph {
    root: PathBuf,
    list_command: Vec<String>,
    build_script: String,
}

impl LernaGraph {
    /// Create a provider for the workspace at `root`
    pub fn new(root: &Path, list_command: Vec<String>, build_script: impl Into<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            list_command,
            build_script: build_script.into(),
        }
    }

    async fn list(&self) -> TarmacResult<Vec<ListedPackage>> {
        let shown = display_command(&self.list_command);
        debug!("Listing packages: {}", shown);

        let mut cmd = local_command(&self.root, &self.list_command)
            .ok_or_else(|| TarmacError::PackageList("empty list command".to_string()))?;
        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TarmacError::command_failed(&shown, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TarmacError::PackageList(format!(
                "{} failed: {}",
                shown,
                stderr.trim()
            )));
        }

        parse_listing(&output.stdout)
    }
}

/// Parse the JSON array printed by the list command
fn parse_listing(stdout: &[u8]) -> TarmacResult<Vec<ListedPackage>> {
    serde_json::from_slice(stdout)
        .map_err(|e| TarmacError::PackageList(format!("unexpected list output: {}", e)))
}

#[async_trait]
impl PackageGraph for LernaGraph {
    async fn packages(&self) -> TarmacResult<Vec<PackageDescriptor>> {
        let listed = self.list().await?;
        let mut packages = Vec::with_capacity(listed.len());

        // Listing order is the topological order; keep it.
        for entry in listed {
            let location = if entry.location.is_absolute() {
                entry.location
            } else {
                self.root.join(entry.location)
            };
            let manifest = PackageManifest::read(&location).await?;

            packages.push(PackageDescriptor {
                has_build_step: manifest.has_script(&self.build_script),
                dependency_names: manifest.dependency_names(),
                name: entry.name,
                location,
            });
        }

        debug!("Workspace has {} packages", packages.len());
        Ok(packages)
    }
}
