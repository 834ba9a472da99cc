//! Configuration schema for tarmac
//!
//! Configuration is stored at `<workspace root>/tarmac.toml`

use serde::{Deserialize, Serialize};

/// Default cache-busting key
pub const DEFAULT_CACHE_KEY: &str = "v1";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache key and local tier settings
    pub cache: CacheConfig,

    /// Remote tier settings
    pub remote: RemoteConfig,

    /// External commands
    pub commands: CommandsConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache-busting key appended to every cache key
    pub key: String,

    /// Local cache folder (`~` expands, relative paths resolve against the workspace root)
    pub folder: String,

    /// Lockfile folded into the global hash and the dependency cache key
    pub lockfile: String,

    /// Extra repo-global files whose change invalidates every package
    pub global_dependencies: Vec<String>,

    /// Directories packed into the install-time dependency cache
    pub workspace_dirs: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_CACHE_KEY.to_string(),
            folder: ".tarmac".to_string(),
            lockfile: "yarn.lock".to_string(),
            global_dependencies: vec![],
            workspace_dirs: vec![
                "node_modules".to_string(),
                "packages/node_modules".to_string(),
            ],
        }
    }
}

/// Remote blob store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL (`https://...` for an HTTP store, `file://...` for a shared directory)
    pub url: Option<String>,

    /// Bucket or container name
    pub bucket: Option<String>,

    /// Bearer token sent with every request
    pub token: Option<String>,
}

impl RemoteConfig {
    /// Whether a remote tier is configured at all
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// External command lines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Lists packages as JSON in topological order
    pub list: Vec<String>,

    /// Installs dependencies
    pub install: Vec<String>,

    /// Builds packages; `--scope <name>` is appended per package
    pub build: Vec<String>,

    /// Manifest script whose presence marks a package as buildable
    pub build_script: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            list: ["lerna", "ls", "--all", "--toposort", "--json"]
                .map(String::from)
                .to_vec(),
            install: ["yarn", "install", "--frozen-lockfile"]
                .map(String::from)
                .to_vec(),
            build: ["lerna", "run", "build", "--stream", "--reject-cycles"]
                .map(String::from)
                .to_vec(),
            build_script: "build".to_string(),
        }
    }
}
