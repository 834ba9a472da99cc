//! `package.json` parsing

use crate::error::{TarmacError, TarmacResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// The subset of a package manifest tarmac reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: Option<String>,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    pub scripts: BTreeMap<String, String>,
}

impl PackageManifest {
    /// Read `package.json` from a package directory
    pub async fn read(dir: &Path) -> TarmacResult<Self> {
        let path = dir.join("package.json");
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TarmacError::ManifestNotFound(path));
            }
            Err(e) => {
                return Err(TarmacError::io(format!("reading {}", path.display()), e));
            }
        };

        serde_json::from_str(&content).map_err(|e| TarmacError::ManifestInvalid {
            path,
            reason: e.to_string(),
        })
    }

    /// Names of runtime and dev dependencies, sorted and deduplicated
    pub fn dependency_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Whether the manifest defines a non-empty script with this name
    pub fn has_script(&self, script: &str) -> bool {
        self.scripts.get(script).is_some_and(|s| !s.trim().is_empty())
    }
}
