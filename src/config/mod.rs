//! Configuration management for tarmac

pub mod schema;

pub use schema::Config;

use crate::error::{TarmacError, TarmacResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Config file name looked up at the workspace root
pub const CONFIG_FILE_NAME: &str = "tarmac.toml";

/// Values supplied on the command line or through the environment.
///
/// Each `Some` replaces the corresponding file setting.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub cache_key: Option<String>,
    pub cache_folder: Option<String>,
    pub remote_url: Option<String>,
    pub bucket: Option<String>,
    pub token: Option<String>,
}

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager reading `tarmac.toml` from the workspace root
    pub fn for_root(root: &Path) -> Self {
        Self {
            config_path: root.join(CONFIG_FILE_NAME),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Walk up from `start` to the workspace root.
    ///
    /// The root is the first directory whose `package.json` declares
    /// `workspaces`, or that holds both a `package.json` and a `lerna.json`.
    pub fn find_workspace_root(start: &Path) -> TarmacResult<PathBuf> {
        for dir in start.ancestors() {
            let manifest = dir.join("package.json");
            if !manifest.is_file() {
                continue;
            }
            if dir.join("lerna.json").is_file() || declares_workspaces(&manifest) {
                debug!("Workspace root: {}", dir.display());
                return Ok(dir.to_path_buf());
            }
        }
        Err(TarmacError::WorkspaceRootNotFound(start.to_path_buf()))
    }

    /// Load configuration, falling back to defaults if the file does not exist
    pub async fn load(&self) -> TarmacResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> TarmacResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| TarmacError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| TarmacError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load the file and apply command-line overrides on top
    pub async fn load_with(&self, overrides: &Overrides) -> TarmacResult<Config> {
        let mut config = self.load().await?;
        Self::apply(&mut config, overrides);
        Ok(config)
    }

    /// Apply overrides to a loaded configuration
    pub fn apply(config: &mut Config, overrides: &Overrides) {
        if let Some(ref key) = overrides.cache_key {
            config.cache.key = key.clone();
        }
        if let Some(ref folder) = overrides.cache_folder {
            config.cache.folder = folder.clone();
        }
        if let Some(ref url) = overrides.remote_url {
            config.remote.url = Some(url.clone());
        }
        if let Some(ref bucket) = overrides.bucket {
            config.remote.bucket = Some(bucket.clone());
        }
        if let Some(ref token) = overrides.token {
            config.remote.token = Some(token.clone());
        }
    }

    /// Resolve the local cache folder against the workspace root.
    ///
    /// A leading `~` expands to the home directory; other relative paths are
    /// taken relative to `root`.
    pub fn cache_dir(config: &Config, root: &Path) -> PathBuf {
        let folder = config.cache.folder.as_str();
        if folder == "~" {
            return dirs::home_dir().unwrap_or_else(|| root.to_path_buf());
        }
        if let Some(rest) = folder.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        let path = Path::new(folder);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

fn declares_workspaces(manifest: &Path) -> bool {
    std::fs::read_to_string(manifest)
        .ok()
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
        .is_some_and(|v| v.get("workspaces").is_some())
}
